//! espeak-ng speech engine: one child process per utterance.
//!
//! Playback is owned by the child process, so cancelling an utterance is
//! killing it. A new utterance supersedes whatever is still playing.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::catalog::{SystemVoiceCatalog, PERSONAL_PREFIX};
use crate::announcer::platform::{SpeechEngine, SpeechError, Utterance};
use crate::config::SpeechConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct EspeakEngine {
    program: String,
    rate: u32,
    pitch: u32,
    catalog: Arc<SystemVoiceCatalog>,
    active: Mutex<Option<Child>>,
}

impl EspeakEngine {
    pub fn new(config: &SpeechConfig, catalog: Arc<SystemVoiceCatalog>) -> Self {
        Self {
            program: config.engine.clone(),
            rate: config.rate,
            pitch: config.pitch,
            catalog,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<Child>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command-line arguments for `utterance`, excluding the text.
    pub fn voice_args(&self, utterance: &Utterance) -> Result<Vec<String>, SpeechError> {
        let mut voice = None;
        let mut rate = self.rate;
        let mut pitch = self.pitch;

        match utterance.voice_id.as_deref() {
            None => {}
            Some(id) if id.starts_with(PERSONAL_PREFIX) => {
                let profile = self
                    .catalog
                    .personal_profile(id)
                    .ok_or_else(|| SpeechError::UnknownVoice(id.to_string()))?;
                // Assistive settings win over the profile's own prosody.
                if !utterance.prefers_assistive_technology_settings {
                    rate = profile.rate.unwrap_or(rate);
                    pitch = profile.pitch.unwrap_or(pitch);
                }
                voice = Some(profile.voice_arg());
            }
            Some(id) => voice = Some(id.to_string()),
        }

        let mut args = Vec::with_capacity(6);
        if let Some(voice) = voice {
            args.push("-v".to_string());
            args.push(voice);
        }
        args.push("-s".to_string());
        args.push(rate.to_string());
        args.push("-p".to_string());
        args.push(pitch.min(99).to_string());
        Ok(args)
    }

    /// Wait until the current utterance has finished playing.
    pub async fn wait_until_done(&self) {
        while self.is_speaking() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        let args = self.voice_args(utterance)?;
        debug!("{} {} {:?}", self.program, args.join(" "), utterance.text);

        let child = Command::new(&self.program)
            .args(&args)
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(self.program.clone(), e))?;

        let mut active = self.active();
        if let Some(mut previous) = active.replace(child) {
            if let Err(e) = previous.start_kill() {
                debug!("Previous utterance already finished: {e}");
            }
        }
        Ok(())
    }

    fn stop_speaking(&self) {
        if let Some(mut child) = self.active().take() {
            match child.start_kill() {
                Ok(()) => info!("Speech cancelled"),
                Err(e) => warn!("Failed to cancel speech: {e}"),
            }
        }
    }

    fn is_speaking(&self) -> bool {
        let mut active = self.active();
        let running = match active.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            *active = None;
        }
        running
    }
}
