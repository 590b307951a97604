//! Announcement session state: authorization outcome, personal voices, selection
//! and whether the minute announcements are running.

/// Result of the single-shot personal voice authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Denied,
    Unsupported,
    Authorized,
}

/// Authorization state as seen by the session. Starts as `Unknown` and moves
/// to one of the terminal outcomes exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthorizationState {
    #[default]
    Unknown,
    Denied,
    Unsupported,
    Authorized,
}

impl AuthorizationState {
    pub fn is_resolved(self) -> bool {
        self != Self::Unknown
    }
}

impl From<AuthorizationOutcome> for AuthorizationState {
    fn from(outcome: AuthorizationOutcome) -> Self {
        match outcome {
            AuthorizationOutcome::Denied => Self::Denied,
            AuthorizationOutcome::Unsupported => Self::Unsupported,
            AuthorizationOutcome::Authorized => Self::Authorized,
        }
    }
}

impl std::fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Denied => write!(f, "DENIED"),
            Self::Unsupported => write!(f, "UNSUPPORTED"),
            Self::Authorized => write!(f, "AUTHORIZED"),
        }
    }
}

/// An installed voice as reported by the voice catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    /// Opaque identifier, stable for the lifetime of the voice.
    pub id: String,
    pub name: String,
    /// BCP 47 style language tag as reported by the engine (may be wrong, see
    /// `display::language_display_name`).
    pub language: String,
    /// User-created personal voice rather than a stock engine voice.
    pub personal: bool,
}

impl VoiceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            language: language.into(),
            personal: false,
        }
    }

    pub fn personal(mut self) -> Self {
        self.personal = true;
        self
    }
}

/// Snapshot of everything the display surface needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncementSession {
    pub authorization: AuthorizationState,
    pub available_voices: Vec<VoiceDescriptor>,
    pub selected_voice_id: Option<String>,
    pub is_active: bool,
}

impl AnnouncementSession {
    /// The toggle is usable only when authorized and at least one personal
    /// voice exists.
    pub fn can_activate(&self) -> bool {
        self.authorization == AuthorizationState::Authorized && !self.available_voices.is_empty()
    }

    /// `is_active` implies the session could have been activated.
    pub fn invariant_holds(&self) -> bool {
        !self.is_active || self.can_activate()
    }

    pub fn voice(&self, id: &str) -> Option<&VoiceDescriptor> {
        self.available_voices.iter().find(|v| v.id == id)
    }

    pub fn selected_voice(&self) -> Option<&VoiceDescriptor> {
        self.selected_voice_id.as_deref().and_then(|id| self.voice(id))
    }

    /// Replace the voice list with the personal voices from `catalog`, keeping a
    /// still-valid selection and otherwise selecting the first voice. Ids are
    /// unique; a repeated id keeps its first entry.
    pub fn load_personal_voices(&mut self, catalog: Vec<VoiceDescriptor>) {
        self.available_voices.clear();
        for voice in catalog.into_iter().filter(|v| v.personal) {
            if self.voice(&voice.id).is_none() {
                self.available_voices.push(voice);
            }
        }

        let selection_valid = self
            .selected_voice_id
            .as_deref()
            .is_some_and(|id| self.voice(id).is_some());
        if !selection_valid {
            self.selected_voice_id = self.available_voices.first().map(|v| v.id.clone());
        }
    }
}
