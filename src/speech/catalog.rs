//! Installed voice catalog: stock espeak-ng voices plus personal voice
//! profiles stored as YAML files in the personal voice directory.
//!
//! A profile file `~/.local/share/time-announcer/voices/luke.yaml`:
//!
//! ```yaml
//! name: Luke
//! language: en-US
//! base_voice: en-us
//! variant: m3
//! pitch: 45
//! rate: 160
//! ```
//!
//! becomes the personal voice `personal:luke`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::announcer::platform::VoiceCatalog;
use crate::announcer::session::VoiceDescriptor;

pub const PERSONAL_PREFIX: &str = "personal:";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read voice profile {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse voice profile {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
}

fn default_base_voice() -> String {
    "en-us".to_string()
}

/// A user-created personal voice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceProfile {
    pub name: String,
    pub language: String,
    /// espeak-ng voice the profile is built on.
    #[serde(default = "default_base_voice")]
    pub base_voice: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub pitch: Option<u32>,
    /// Words per minute.
    #[serde(default)]
    pub rate: Option<u32>,
}

impl VoiceProfile {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yml::from_str(&contents).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// espeak-ng `-v` argument, e.g. `en-us+m3`.
    pub fn voice_arg(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}+{variant}", self.base_voice),
            None => self.base_voice.clone(),
        }
    }
}

fn is_profile_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// Catalog backed by `espeak-ng --voices` and the personal voice directory.
pub struct SystemVoiceCatalog {
    program: String,
    personal_dir: PathBuf,
}

impl SystemVoiceCatalog {
    pub fn new(program: impl Into<String>, personal_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            personal_dir: personal_dir.into(),
        }
    }

    pub fn personal_dir(&self) -> &Path {
        &self.personal_dir
    }

    /// Personal voice profiles keyed by voice id, ordered by file name.
    pub fn personal_profiles(&self) -> Vec<(String, VoiceProfile)> {
        let entries = match fs::read_dir(&self.personal_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No personal voices in {}: {e}", self.personal_dir.display());
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_profile_file(p))
            .collect();
        paths.sort();

        // `luke.yaml` sorts before `luke.yml`, matching the lookup order of
        // `personal_profile`, so the first file for a stem owns the id.
        let mut profiles: Vec<(String, VoiceProfile)> = Vec::new();
        for path in paths {
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let id = format!("{PERSONAL_PREFIX}{}", stem.to_string_lossy());
            if profiles.iter().any(|(seen, _)| *seen == id) {
                warn!("Skipping {}: voice {id} is already defined", path.display());
                continue;
            }
            match VoiceProfile::load(&path) {
                Ok(profile) => profiles.push((id, profile)),
                Err(e) => warn!("Skipping voice profile: {e}"),
            }
        }
        profiles
    }

    /// Look up one personal profile by voice id without scanning the directory.
    pub fn personal_profile(&self, id: &str) -> Option<VoiceProfile> {
        let stem = id.strip_prefix(PERSONAL_PREFIX)?;
        if stem.is_empty() || stem.contains(['/', '\\']) {
            return None;
        }
        ["yaml", "yml"].iter().find_map(|ext| {
            let path = self.personal_dir.join(format!("{stem}.{ext}"));
            if !path.exists() {
                return None;
            }
            match VoiceProfile::load(&path) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!("Voice profile unusable: {e}");
                    None
                }
            }
        })
    }

    /// Stock voices reported by the engine. Empty if the engine is missing.
    pub fn system_voices(&self) -> Vec<VoiceDescriptor> {
        match Command::new(&self.program).arg("--voices").output() {
            Ok(output) if output.status.success() => {
                parse_voice_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                warn!("{} --voices exited with {}", self.program, output.status);
                Vec::new()
            }
            Err(e) => {
                debug!("Cannot list {} voices: {e}", self.program);
                Vec::new()
            }
        }
    }
}

impl VoiceCatalog for SystemVoiceCatalog {
    fn voices(&self) -> Vec<VoiceDescriptor> {
        let mut voices: Vec<VoiceDescriptor> = self
            .personal_profiles()
            .into_iter()
            .map(|(id, profile)| VoiceDescriptor::new(id, profile.name, profile.language).personal())
            .collect();
        voices.extend(self.system_voices());
        voices
    }

    fn resolve(&self, id: &str) -> Option<VoiceDescriptor> {
        if id.starts_with(PERSONAL_PREFIX) {
            return self
                .personal_profile(id)
                .map(|profile| VoiceDescriptor::new(id, profile.name, profile.language).personal());
        }
        self.system_voices().into_iter().find(|v| v.id == id)
    }
}

/// Parse `espeak-ng --voices` output:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
pub fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    let mut voices: Vec<VoiceDescriptor> = Vec::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let language = fields[1];
        if voices.iter().any(|v| v.id == language) {
            continue;
        }
        let name = fields[3].replace('_', " ");
        voices.push(VoiceDescriptor::new(language, name, language));
    }
    voices
}
