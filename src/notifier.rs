//! Desktop notifications via notify-rust (D-Bus).

use notify_rust::Notification;
use tracing::{debug, warn};

use crate::announcer::session::{AnnouncementSession, AuthorizationState};

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(body)
            .icon("preferences-system-time")
            .timeout(3000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }

    /// Notify about the change from `prev` to `next`, if it is worth one.
    pub fn session_changed(&self, prev: &AnnouncementSession, next: &AnnouncementSession) {
        if let Some((summary, body)) = transition_message(prev, next) {
            self.notify(summary, &body);
        }
    }
}

/// Notification for a session transition: announcements starting or stopping,
/// or authorization ending in a state that can never announce.
pub fn transition_message(
    prev: &AnnouncementSession,
    next: &AnnouncementSession,
) -> Option<(&'static str, String)> {
    if prev.authorization != next.authorization {
        return match next.authorization {
            AuthorizationState::Denied => Some((
                "Personal Voice denied",
                "Time announcements are unavailable.".to_string(),
            )),
            AuthorizationState::Unsupported => Some((
                "Personal Voice unsupported",
                "The speech engine could not be started.".to_string(),
            )),
            AuthorizationState::Authorized if next.available_voices.is_empty() => Some((
                "No Personal Voices",
                "Create a voice profile to announce the time.".to_string(),
            )),
            _ => None,
        };
    }

    match (prev.is_active, next.is_active) {
        (false, true) => {
            let voice = next.selected_voice().map_or("default voice", |v| v.name.as_str());
            Some(("Saying the time", format!("Every minute with {voice}")))
        }
        (true, false) => Some(("Stopped saying the time", String::new())),
        _ => None,
    }
}
