//! Collaborators the announcer drives but does not implement.
//!
//! Each one is injected into the controller so tests can substitute fakes:
//! - `Authorizer`: single-shot async personal voice authorization
//! - `VoiceCatalog`: synchronous listing of installed voices
//! - `SpeechEngine`: utterance playback with immediate cancellation
//! - `Clock`: wall-clock time

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::session::{AuthorizationOutcome, VoiceDescriptor};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine `{0}` could not be started: {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("unknown voice: {0}")]
    UnknownVoice(String),
}

/// A single unit of text handed to the speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// Voice to speak with; `None` lets the engine pick its default.
    pub voice_id: Option<String>,
    /// Ask the engine to honour the user's assistive-technology speech
    /// settings (rate, pitch) over the voice's own.
    pub prefers_assistive_technology_settings: bool,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
            prefers_assistive_technology_settings: false,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn preferring_assistive_settings(mut self) -> Self {
        self.prefers_assistive_technology_settings = true;
        self
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Resolves once; the outcome is final for the process.
    async fn request_authorization(&self) -> AuthorizationOutcome;
}

pub trait VoiceCatalog: Send + Sync {
    /// Every installed voice, personal or not, in display order.
    fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Look a voice up again, failing if it has been removed since listing.
    fn resolve(&self, id: &str) -> Option<VoiceDescriptor> {
        self.voices().into_iter().find(|v| v.id == id)
    }
}

pub trait SpeechEngine: Send + Sync {
    /// Start speaking. Whatever is currently playing is superseded according
    /// to the engine's own queueing rules.
    fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError>;

    /// Stop any in-flight utterance immediately. Safe to call when silent.
    fn stop_speaking(&self);

    fn is_speaking(&self) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
