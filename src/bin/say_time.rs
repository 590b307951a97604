//! say-time: speak the current time once and exit.
//!
//! Uses the same config, voices and engine as the announcer, so it doubles as
//! a quick check that a personal voice profile sounds right.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use time_announcer::announcer::controller::announcement_text;
use time_announcer::announcer::platform::{SpeechEngine, Utterance, VoiceCatalog};
use time_announcer::announcer::schedule::Calendar;
use time_announcer::config::Config;
use time_announcer::speech::catalog::SystemVoiceCatalog;
use time_announcer::speech::espeak::EspeakEngine;

/// Longest a single announcement may take before we give up waiting.
const MAX_PLAYBACK: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "say-time", about = "Speak the current time once")]
struct Args {
    /// Voice id, e.g. personal:luke or en-gb (first personal voice if omitted)
    #[arg(long)]
    voice: Option<String>,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref());
    let calendar = Calendar::from_zone_name(config.announcer.timezone.as_deref(), config.announcer.time_format)
        .context("invalid announcer.timezone")?;

    let catalog = Arc::new(SystemVoiceCatalog::new(
        config.speech.engine.clone(),
        config.voices.personal_dir.clone(),
    ));
    let voice = match args.voice {
        Some(id) => match catalog.resolve(&id) {
            Some(voice) => Some(voice),
            None => bail!("unknown voice {id:?}, see `time-announcer --list-voices`"),
        },
        None => catalog.voices().into_iter().find(|v| v.personal),
    };

    let mut utterance = Utterance::new(announcement_text(&calendar, Utc::now()));
    if let Some(voice) = voice {
        info!("Using voice {} ({})", voice.name, voice.id);
        utterance = utterance.with_voice(voice.id).preferring_assistive_settings();
    }

    let engine = EspeakEngine::new(&config.speech, catalog);
    println!("{}", utterance.text);
    engine.speak(&utterance).context("failed to speak")?;

    if tokio::time::timeout(MAX_PLAYBACK, engine.wait_until_done()).await.is_err() {
        engine.stop_speaking();
        bail!("playback did not finish within {MAX_PLAYBACK:?}");
    }
    Ok(())
}
