//! time-announcer: says the time every minute in a personal voice.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use time_announcer::announcer::controller::{AnnouncementController, Collaborators, ControllerHandle};
use time_announcer::announcer::platform::{SystemClock, VoiceCatalog};
use time_announcer::announcer::schedule::Calendar;
use time_announcer::config::Config;
use time_announcer::display::{language_display_name, Screen};
use time_announcer::notifier::Notifier;
use time_announcer::speech::catalog::SystemVoiceCatalog;
use time_announcer::speech::consent::ConsentAuthorizer;
use time_announcer::speech::espeak::EspeakEngine;

#[derive(Parser, Debug)]
#[command(name = "time-announcer", about = "Announces the time every minute in a personal voice")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the installed voices and exit
    #[arg(long)]
    list_voices: bool,

    /// Start announcing as soon as a personal voice is available
    #[arg(long)]
    start: bool,
}

/// A line typed on stdin.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Toggle,
    SelectVoice(usize),
    Redraw,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" | "t" => Input::Toggle,
        "l" => Input::Redraw,
        "q" => Input::Quit,
        _ => match line.strip_prefix("v ").map(|n| n.trim().parse::<usize>()) {
            Some(Ok(n)) if n > 0 => Input::SelectVoice(n),
            _ => Input::Unknown(line.to_string()),
        },
    }
}

fn print_voices(catalog: &SystemVoiceCatalog) {
    println!("Personal voices ({}):", catalog.personal_dir().display());
    let voices = catalog.voices();
    for voice in voices.iter().filter(|v| v.personal) {
        println!("  {:<24} {} ({})", voice.id, voice.name, language_display_name(voice));
    }
    println!("System voices:");
    for voice in voices.iter().filter(|v| !v.personal) {
        println!("  {:<24} {} ({})", voice.id, voice.name, language_display_name(voice));
    }
}

async fn handle_input(handle: &ControllerHandle, input: Input) -> anyhow::Result<bool> {
    match input {
        Input::Toggle => {
            if !handle.session().can_activate() {
                println!("Announcements are unavailable right now.");
            } else {
                handle.toggle().await?;
            }
        }
        Input::SelectVoice(n) => {
            let session = handle.session();
            match session.available_voices.get(n - 1) {
                Some(voice) => {
                    handle.select_voice(voice.id.clone()).await?;
                }
                None => println!("No voice number {n}."),
            }
        }
        Input::Redraw => println!("{}", Screen::from_session(&handle.session()).render()),
        Input::Quit => return Ok(false),
        Input::Unknown(line) => {
            println!("Unknown command {line:?}: Enter/t toggle, v <n> voice, l redraw, q quit");
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("time-announcer starting");

    let config = Config::load(args.config.as_deref());
    info!("Config loaded: {:?}", config.announcer);

    let catalog = Arc::new(SystemVoiceCatalog::new(
        config.speech.engine.clone(),
        config.voices.personal_dir.clone(),
    ));
    if args.list_voices {
        print_voices(&catalog);
        return Ok(());
    }

    let calendar = Calendar::from_zone_name(config.announcer.timezone.as_deref(), config.announcer.time_format)
        .context("invalid announcer.timezone")?;
    info!("Time zone: {:?}", calendar.zone());
    let speech = Arc::new(EspeakEngine::new(&config.speech, catalog.clone()));
    let authorizer = Arc::new(ConsentAuthorizer::new(
        config.speech.engine.clone(),
        config.authorization.consent,
    ));
    let notifier = Notifier::new(config.feedback.notifications);

    let handle = AnnouncementController::spawn(
        Collaborators {
            speech,
            catalog,
            clock: Arc::new(SystemClock),
            calendar,
        },
        authorizer,
    );

    let mut auto_start = args.start || config.announcer.auto_start;
    let mut state = handle.subscribe();
    let mut shown = state.borrow_and_update().clone();
    println!("{}", Screen::from_session(&shown).render());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    warn!("Announcement controller stopped");
                    break;
                }
                let session = state.borrow_and_update().clone();
                notifier.session_changed(&shown, &session);
                println!("{}", Screen::from_session(&session).render());

                if auto_start && session.authorization.is_resolved() {
                    auto_start = false;
                    if session.can_activate() && !session.is_active {
                        info!("Auto-starting announcements");
                        handle.toggle().await?;
                    }
                }
                shown = session;
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if !handle_input(&handle, parse_input(&line)).await? {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed, press Ctrl-C to quit");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    if handle.session().is_active {
        handle.toggle().await?;
    }
    info!("time-announcer stopped");
    Ok(())
}
