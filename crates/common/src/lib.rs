//! Shared configuration, errors, database setup and outbox domain types.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
