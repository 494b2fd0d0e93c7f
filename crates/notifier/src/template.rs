//! Template renderer. Turns a template key and payload into email content.
//!
//! Rendering is total: every field has a literal fallback and unknown or
//! absent keys resolve to the generic template, so this never fails.

use serde_json::Value;

/// Rendered email content ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Known render strategies, selected by exact (case-sensitive) template key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    OrgInvite,
    ResourceInvite,
    UserInvite,
    Generic,
}

impl Template {
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some("org_invite_email") => Template::OrgInvite,
            Some("resource_invite_email") => Template::ResourceInvite,
            Some("user_invite_email") => Template::UserInvite,
            _ => Template::Generic,
        }
    }
}

/// Render the subject and body for a template key and its payload.
pub fn render(template_key: Option<&str>, payload: &Value) -> RenderedEmail {
    let (subject, body) = match Template::from_key(template_key) {
        Template::OrgInvite => {
            let org = field(payload, "organization_name")
                .unwrap_or_else(|| "your organization".to_string());
            let role = field(payload, "role").unwrap_or_else(|| "member".to_string());
            let accept_url = field(payload, "accept_url").unwrap_or_default();

            (
                format!("You were invited to join {}", org),
                format!(
                    "You were invited to join {} as {}.\n\nAccept invitation:\n{}",
                    org, role, accept_url
                ),
            )
        }
        Template::ResourceInvite => {
            let resource_type =
                field(payload, "resource_type").unwrap_or_else(|| "resource".to_string());
            let resource_name = field(payload, "resource_name")
                .or_else(|| field(payload, "resource_id"))
                .unwrap_or_else(|| "resource".to_string());
            let accept_url = field(payload, "accept_url").unwrap_or_default();

            (
                format!("You were invited to collaborate on {}", resource_name),
                format!(
                    "You were invited to collaborate on {} '{}'.\n\nAccept invitation:\n{}",
                    resource_type, resource_name, accept_url
                ),
            )
        }
        Template::UserInvite => {
            let display_name =
                field(payload, "display_name").unwrap_or_else(|| "there".to_string());
            let accept_url = field(payload, "accept_url").unwrap_or_default();

            (
                "Verify your email".to_string(),
                format!(
                    "Hi {},\n\nPlease verify your email by clicking:\n{}",
                    display_name, accept_url
                ),
            )
        }
        Template::Generic => (
            field(payload, "subject").unwrap_or_else(|| "Notification".to_string()),
            field(payload, "content").unwrap_or_else(|| "You have a new notification.".to_string()),
        ),
    };

    RenderedEmail { subject, body }
}

/// Read a payload field as display text.
///
/// Falsy values count as absent so the caller's default applies: missing
/// keys, `null`, `false`, zero, `""` and empty arrays or objects. Any other
/// string is kept verbatim, whitespace included; `true` renders as `True`.
pub(crate) fn field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("True".to_string()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}
