//! Terminal display surface.
//!
//! Turns an `AnnouncementSession` into one of four mutually exclusive status
//! views plus the start/stop button.

use std::fmt::Write as _;

use crate::announcer::session::{AnnouncementSession, AuthorizationState, VoiceDescriptor};

pub const TITLE: &str = "Time Announcer";

const PENDING: &str = "Requesting Personal Voice authorization...";
const DENIED: &str = "Personal Voice authorization has been denied. \
    Set `authorization.consent: allow` in your config to enable it.";
const UNSUPPORTED: &str = "Personal Voice is not supported on this device: \
    the speech engine could not be started.";
const NO_VOICES: &str = "No Personal Voices found. \
    Create a voice profile in your personal voice directory.";

/// Some engines report US English personal voices with this tag.
const MISLABELED_PERSONAL_TAG: &str = "zh-CH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRow {
    /// 1-based, as typed in `v <n>`.
    pub number: usize,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Denied,
    Unsupported,
    NoVoices,
    Picker(Vec<VoiceRow>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub status: Status,
    pub button_label: &'static str,
    pub button_enabled: bool,
}

impl Screen {
    pub fn from_session(session: &AnnouncementSession) -> Self {
        let status = match session.authorization {
            AuthorizationState::Unknown => Status::Pending,
            AuthorizationState::Denied => Status::Denied,
            AuthorizationState::Unsupported => Status::Unsupported,
            AuthorizationState::Authorized if session.available_voices.is_empty() => Status::NoVoices,
            AuthorizationState::Authorized => Status::Picker(
                session
                    .available_voices
                    .iter()
                    .enumerate()
                    .map(|(i, voice)| VoiceRow {
                        number: i + 1,
                        label: format!("{} ({})", voice.name, language_display_name(voice)),
                        selected: session.selected_voice_id.as_deref() == Some(voice.id.as_str()),
                    })
                    .collect(),
            ),
        };

        Self {
            status,
            button_label: if session.is_active { "Stop" } else { "Start Saying The Time" },
            button_enabled: session.can_activate(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("== {TITLE} ==\n\n");
        match &self.status {
            Status::Pending => out.push_str(PENDING),
            Status::Denied => out.push_str(DENIED),
            Status::Unsupported => out.push_str(UNSUPPORTED),
            Status::NoVoices => out.push_str(NO_VOICES),
            Status::Picker(rows) => {
                out.push_str("Select a Personal Voice:");
                for row in rows {
                    let marker = if row.selected { '*' } else { ' ' };
                    let _ = write!(out, "\n {marker} {}. {}", row.number, row.label);
                }
            }
        }

        let _ = write!(out, "\n\n[ {} ]", self.button_label);
        if self.button_enabled {
            out.push_str("  (Enter to toggle, v <n> to pick a voice, q to quit)");
        } else {
            out.push_str("  (disabled)");
        }
        out
    }
}

/// Human readable language for a voice, e.g. "English (United States)".
pub fn language_display_name(voice: &VoiceDescriptor) -> String {
    if voice.personal && voice.language.eq_ignore_ascii_case(MISLABELED_PERSONAL_TAG) {
        return locale_display_name("en-US").unwrap_or_else(|| "English (US)".to_string());
    }
    locale_display_name(&voice.language).unwrap_or_else(|| voice.language.clone())
}

/// Display name for a language tag, `None` if the language is unknown.
pub fn locale_display_name(tag: &str) -> Option<String> {
    let mut parts = tag.split(['-', '_']);
    let language = language_name(parts.next()?)?;
    let region = parts.find_map(region_name);
    Some(match region {
        Some(region) => format!("{language} ({region})"),
        None => language.to_string(),
    })
}

fn language_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_lowercase().as_str() {
        "ar" => "Arabic",
        "cs" => "Czech",
        "da" => "Danish",
        "de" => "German",
        "el" => "Greek",
        "en" => "English",
        "es" => "Spanish",
        "fi" => "Finnish",
        "fr" => "French",
        "he" => "Hebrew",
        "hi" => "Hindi",
        "hu" => "Hungarian",
        "id" => "Indonesian",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "nb" | "no" => "Norwegian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ro" => "Romanian",
        "ru" => "Russian",
        "sk" => "Slovak",
        "sv" => "Swedish",
        "th" => "Thai",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "vi" => "Vietnamese",
        "zh" => "Chinese",
        _ => return None,
    };
    Some(name)
}

fn region_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_uppercase().as_str() {
        "AU" => "Australia",
        "BE" => "Belgium",
        "BR" => "Brazil",
        "CA" => "Canada",
        "CH" => "Switzerland",
        "CN" => "China mainland",
        "DE" => "Germany",
        "ES" => "Spain",
        "FR" => "France",
        "GB" => "United Kingdom",
        "HK" => "Hong Kong",
        "IE" => "Ireland",
        "IN" => "India",
        "IT" => "Italy",
        "JP" => "Japan",
        "MX" => "Mexico",
        "NL" => "Netherlands",
        "NZ" => "New Zealand",
        "PT" => "Portugal",
        "TW" => "Taiwan",
        "US" => "United States",
        "ZA" => "South Africa",
        "419" => "Latin America",
        _ => return None,
    };
    Some(name)
}
