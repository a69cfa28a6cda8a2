//! Server-pushed notifications.
//!
//! The payload of a push message becomes the notification body verbatim; a
//! push with no payload gets a fixed fallback body. Actually displaying the
//! notification is the host's job, this module only decides what it says
//! and what activating it does.

/// Title shown on every notification.
pub const NOTIFICATION_TITLE: &str = "Field Audit";

/// Body used when a push arrives without a payload.
pub const DEFAULT_BODY: &str = "New notification";

const NOTIFICATION_ICON: &str = "/icon-192.png";

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
}

/// Build the notification for a raw push payload.
pub fn notification_for_push(payload: Option<&str>) -> Notification {
  Notification {
    title: NOTIFICATION_TITLE.to_string(),
    body: payload.unwrap_or(DEFAULT_BODY).to_string(),
    icon: NOTIFICATION_ICON.to_string(),
    badge: NOTIFICATION_ICON.to_string(),
  }
}

/// What activating a notification does: dismiss it and bring the
/// application root into focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickAction {
  pub dismiss: bool,
  pub focus: &'static str,
}

pub fn notification_click() -> ClickAction {
  ClickAction {
    dismiss: true,
    focus: "/",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_payload_becomes_body_verbatim() {
    let n = notification_for_push(Some("Audit B-12 was reviewed"));
    assert_eq!(n.body, "Audit B-12 was reviewed");
    assert_eq!(n.title, NOTIFICATION_TITLE);
    assert_eq!(n.icon, n.badge);
  }

  #[test]
  fn test_missing_payload_uses_fallback_body() {
    let n = notification_for_push(None);
    assert_eq!(n.body, DEFAULT_BODY);
  }

  #[test]
  fn test_click_dismisses_and_focuses_root() {
    let action = notification_click();
    assert!(action.dismiss);
    assert_eq!(action.focus, "/");
  }
}
