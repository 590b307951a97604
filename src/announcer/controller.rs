//! Announcement controller.
//!
//! All session state lives on one tokio task that handles `Command`s in
//! order. The authorization request and the minute ticker run elsewhere and
//! only ever talk to the controller by sending commands into its channel, so
//! their results are applied on the controller's own context.
//!
//! Unknown → {Denied | Unsupported | Authorized}; inactive ⇄ active

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::platform::{Authorizer, Clock, SpeechEngine, Utterance, VoiceCatalog};
use super::schedule::{Calendar, MinuteTicker, ANNOUNCE_PERIOD};
use super::session::{AnnouncementSession, AuthorizationOutcome, AuthorizationState, VoiceDescriptor};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("announcement controller has shut down")]
    Closed,
}

/// Messages processed on the controller task.
#[derive(Debug)]
pub enum Command {
    Toggle { reply: oneshot::Sender<bool> },
    SelectVoice { id: String, reply: oneshot::Sender<bool> },
    /// `voices` is the full catalog listing, empty unless authorized.
    AuthorizationResolved {
        outcome: AuthorizationOutcome,
        voices: Vec<VoiceDescriptor>,
    },
    Tick { generation: u64 },
}

/// Everything the controller drives, injected so tests can swap in fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub speech: Arc<dyn SpeechEngine>,
    pub catalog: Arc<dyn VoiceCatalog>,
    pub clock: Arc<dyn Clock>,
    pub calendar: Calendar,
}

pub struct AnnouncementController {
    session: AnnouncementSession,
    state_tx: watch::Sender<AnnouncementSession>,
    speech: Arc<dyn SpeechEngine>,
    catalog: Arc<dyn VoiceCatalog>,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    ticker: MinuteTicker,
    commands: mpsc::WeakSender<Command>,
}

impl AnnouncementController {
    /// Start the controller task and kick off the authorization request.
    ///
    /// The task ends once every `ControllerHandle` has been dropped.
    pub fn spawn(collaborators: Collaborators, authorizer: Arc<dyn Authorizer>) -> ControllerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(AnnouncementSession::default());

        let controller = Self {
            session: AnnouncementSession::default(),
            state_tx,
            speech: collaborators.speech,
            catalog: collaborators.catalog,
            clock: collaborators.clock,
            calendar: collaborators.calendar,
            ticker: MinuteTicker::new(),
            commands: tx.downgrade(),
        };

        let auth_tx = tx.downgrade();
        let catalog = controller.catalog.clone();
        tokio::spawn(async move {
            info!("Requesting personal voice authorization");
            let outcome = authorizer.request_authorization().await;
            let voices = if outcome == AuthorizationOutcome::Authorized {
                // Listing may shell out to the speech engine.
                tokio::task::spawn_blocking(move || catalog.voices())
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Voice catalog query failed: {e}");
                        Vec::new()
                    })
            } else {
                Vec::new()
            };
            if let Some(sender) = auth_tx.upgrade() {
                let _ = sender.send(Command::AuthorizationResolved { outcome, voices }).await;
            }
        });

        tokio::spawn(controller.run(rx));

        ControllerHandle { tx, state: state_rx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!("All controller handles dropped, shutting down");
        self.stop();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Toggle { reply } => {
                self.toggle();
                let _ = reply.send(self.session.is_active);
            }
            Command::SelectVoice { id, reply } => {
                let _ = reply.send(self.select_voice(&id));
            }
            Command::AuthorizationResolved { outcome, voices } => self.on_authorization(outcome, voices),
            Command::Tick { generation } => {
                if self.session.is_active && self.ticker.is_current(generation) {
                    self.announce_once();
                } else {
                    debug!("Dropping stale tick (generation {generation})");
                }
            }
        }
        debug_assert!(self.session.invariant_holds());
    }

    fn on_authorization(&mut self, outcome: AuthorizationOutcome, voices: Vec<VoiceDescriptor>) {
        if self.session.authorization.is_resolved() {
            debug!("Authorization already resolved, ignoring {outcome:?}");
            return;
        }

        let state = AuthorizationState::from(outcome);
        info!("Authorization: UNKNOWN → {state}");
        self.session.authorization = state;

        if state == AuthorizationState::Authorized {
            self.session.load_personal_voices(voices);
            info!("Loaded {} personal voice(s)", self.session.available_voices.len());
        }
        self.publish();
    }

    fn select_voice(&mut self, id: &str) -> bool {
        if self.session.voice(id).is_none() {
            warn!("Cannot select unknown voice: {id}");
            return false;
        }
        if self.session.selected_voice_id.as_deref() == Some(id) {
            return false;
        }
        self.session.selected_voice_id = Some(id.to_string());
        info!("Voice changed to: {id}");
        self.publish();
        true
    }

    fn toggle(&mut self) {
        if self.session.is_active {
            self.stop();
        } else {
            self.start();
        }
    }

    fn start(&mut self) {
        if self.session.is_active {
            return;
        }
        if !self.session.can_activate() {
            debug!(
                "Toggle ignored: authorization {}, {} voice(s)",
                self.session.authorization,
                self.session.available_voices.len()
            );
            return;
        }

        self.session.is_active = true;
        info!("State: IDLE → ANNOUNCING");
        self.publish();

        self.announce_once();
        if !self.session.is_active {
            // The immediate announcement could not resolve its voice.
            return;
        }

        let now = self.clock.now();
        let first_fire = match self.calendar.next_minute_after(now) {
            Ok(boundary) => {
                let delay = (boundary - now).to_std().unwrap_or_default();
                debug!("Next announcement at {boundary} (in {delay:?})");
                Instant::now() + delay
            }
            Err(e) => {
                debug!("Next minute unavailable ({e}), falling back to a fixed interval");
                Instant::now() + ANNOUNCE_PERIOD
            }
        };
        self.ticker
            .start(first_fire, self.commands.clone(), |generation| Command::Tick { generation });
    }

    fn stop(&mut self) {
        self.ticker.cancel();
        if !self.session.is_active {
            return;
        }
        self.session.is_active = false;
        self.speech.stop_speaking();
        info!("State: ANNOUNCING → IDLE");
        self.publish();
    }

    fn resolve_selected_voice(&self) -> Option<VoiceDescriptor> {
        let id = self.session.selected_voice()?.id.as_str();
        self.catalog.resolve(id)
    }

    fn announce_once(&mut self) {
        let Some(voice) = self.resolve_selected_voice() else {
            warn!(
                "Selected voice {:?} is unavailable, stopping announcements",
                self.session.selected_voice_id
            );
            self.stop();
            return;
        };

        let text = announcement_text(&self.calendar, self.clock.now());
        let utterance = Utterance::new(text)
            .with_voice(voice.id)
            .preferring_assistive_settings();

        info!("Announcing: {}", utterance.text);
        if let Err(e) = self.speech.speak(&utterance) {
            warn!("Failed to speak announcement: {e}");
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.session.clone());
    }
}

/// What gets spoken at `at`, e.g. "The time is 3:00 PM".
pub fn announcement_text(calendar: &Calendar, at: DateTime<Utc>) -> String {
    format!("The time is {}", calendar.short_time(at))
}

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<AnnouncementSession>,
}

impl ControllerHandle {
    /// Start or stop announcing. Returns whether announcements are now active.
    pub async fn toggle(&self) -> Result<bool, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Toggle { reply }, rx).await
    }

    /// Pick one of the available personal voices. Returns whether the
    /// selection changed.
    pub async fn select_voice(&self, id: impl Into<String>) -> Result<bool, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SelectVoice { id: id.into(), reply }, rx).await
    }

    /// Latest published session snapshot.
    pub fn session(&self) -> AnnouncementSession {
        self.state.borrow().clone()
    }

    /// A receiver notified on every session change.
    pub fn subscribe(&self) -> watch::Receiver<AnnouncementSession> {
        self.state.clone()
    }

    /// Wait until the authorization request has resolved.
    pub async fn authorization(&self) -> Result<AuthorizationState, ControllerError> {
        let mut state = self.state.clone();
        let session = state
            .wait_for(|s| s.authorization.is_resolved())
            .await
            .map_err(|_| ControllerError::Closed)?;
        Ok(session.authorization)
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Result<T, ControllerError> {
        self.tx.send(command).await.map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcer::platform::SpeechError;
    use crate::announcer::schedule::{TimeFormat, Zone};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Wall clock that advances with tokio's (pausable) clock.
    struct PausedClock {
        wall: DateTime<Utc>,
        origin: Instant,
    }

    impl PausedClock {
        fn at(h: u32, m: u32, s: u32) -> Self {
            let wall = NaiveDate::from_ymd_opt(2025, 6, 1)
                .and_then(|d| d.and_hms_opt(h, m, s))
                .expect("valid time")
                .and_utc();
            Self {
                wall,
                origin: Instant::now(),
            }
        }
    }

    impl Clock for PausedClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = Instant::now() - self.origin;
            self.wall + chrono::TimeDelta::from_std(elapsed).unwrap_or(chrono::TimeDelta::zero())
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<(Instant, Utterance)>>,
        stops: Mutex<usize>,
    }

    impl RecordingSpeech {
        fn spoken(&self) -> Vec<(Instant, Utterance)> {
            self.spoken.lock().unwrap().clone()
        }

        fn stops(&self) -> usize {
            *self.stops.lock().unwrap()
        }
    }

    impl SpeechEngine for RecordingSpeech {
        fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
            self.spoken.lock().unwrap().push((Instant::now(), utterance.clone()));
            Ok(())
        }

        fn stop_speaking(&self) {
            *self.stops.lock().unwrap() += 1;
        }

        fn is_speaking(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct MutableCatalog(Mutex<Vec<VoiceDescriptor>>);

    impl MutableCatalog {
        fn with(voices: Vec<VoiceDescriptor>) -> Self {
            Self(Mutex::new(voices))
        }

        fn remove(&self, id: &str) {
            self.0.lock().unwrap().retain(|v| v.id != id);
        }
    }

    impl VoiceCatalog for MutableCatalog {
        fn voices(&self) -> Vec<VoiceDescriptor> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FixedAuthorizer(AuthorizationOutcome);

    #[async_trait]
    impl Authorizer for FixedAuthorizer {
        async fn request_authorization(&self) -> AuthorizationOutcome {
            self.0
        }
    }

    fn personal_voices() -> Vec<VoiceDescriptor> {
        vec![
            VoiceDescriptor::new("en-us", "English (America)", "en-US"),
            VoiceDescriptor::new("personal:luke", "Luke", "en-US").personal(),
            VoiceDescriptor::new("personal:ana", "Ana", "es-MX").personal(),
        ]
    }

    struct Harness {
        handle: ControllerHandle,
        speech: Arc<RecordingSpeech>,
        catalog: Arc<MutableCatalog>,
        origin: Instant,
    }

    fn spawn_with(outcome: AuthorizationOutcome, voices: Vec<VoiceDescriptor>, clock: Arc<dyn Clock>) -> Harness {
        let speech = Arc::new(RecordingSpeech::default());
        let catalog = Arc::new(MutableCatalog::with(voices));
        let collaborators = Collaborators {
            speech: speech.clone(),
            catalog: catalog.clone(),
            clock,
            calendar: Calendar::new(Zone::Named(chrono_tz::UTC), TimeFormat::TwelveHour),
        };
        let handle = AnnouncementController::spawn(collaborators, Arc::new(FixedAuthorizer(outcome)));
        Harness {
            handle,
            speech,
            catalog,
            origin: Instant::now(),
        }
    }

    fn spawn_authorized_at(h: u32, m: u32, s: u32) -> Harness {
        spawn_with(
            AuthorizationOutcome::Authorized,
            personal_voices(),
            Arc::new(PausedClock::at(h, m, s)),
        )
    }

    /// Offsets from the harness origin, in whole seconds, of everything spoken.
    fn spoken_offsets(h: &Harness) -> Vec<u64> {
        h.speech
            .spoken()
            .iter()
            .map(|(at, _)| (*at - h.origin).as_secs())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorized_loads_personal_voices() {
        let h = spawn_authorized_at(9, 0, 0);
        assert_eq!(h.handle.authorization().await, Ok(AuthorizationState::Authorized));

        let session = h.handle.session();
        assert_eq!(session.available_voices.len(), 2);
        assert_eq!(session.selected_voice_id.as_deref(), Some("personal:luke"));
        assert!(!session.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_is_noop_when_denied() {
        for outcome in [AuthorizationOutcome::Denied, AuthorizationOutcome::Unsupported] {
            let h = spawn_with(outcome, personal_voices(), Arc::new(PausedClock::at(9, 0, 0)));
            h.handle.authorization().await.unwrap();

            assert_eq!(h.handle.toggle().await, Ok(false));
            let session = h.handle.session();
            assert!(!session.is_active);
            assert!(session.available_voices.is_empty());
            assert!(session.invariant_holds());
            assert!(h.speech.spoken().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_is_noop_without_voices() {
        let voices = vec![VoiceDescriptor::new("en-us", "English", "en-US")];
        let h = spawn_with(AuthorizationOutcome::Authorized, voices, Arc::new(PausedClock::at(9, 0, 0)));
        h.handle.authorization().await.unwrap();

        assert_eq!(h.handle.toggle().await, Ok(false));
        assert!(h.handle.session().invariant_holds());
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_before_authorization_resolves_is_noop() {
        struct NeverAuthorizer;

        #[async_trait]
        impl Authorizer for NeverAuthorizer {
            async fn request_authorization(&self) -> AuthorizationOutcome {
                std::future::pending::<AuthorizationOutcome>().await
            }
        }

        let speech = Arc::new(RecordingSpeech::default());
        let handle = AnnouncementController::spawn(
            Collaborators {
                speech: speech.clone(),
                catalog: Arc::new(MutableCatalog::with(personal_voices())),
                clock: Arc::new(PausedClock::at(9, 0, 0)),
                calendar: Calendar::new(Zone::Named(chrono_tz::UTC), TimeFormat::TwelveHour),
            },
            Arc::new(NeverAuthorizer),
        );

        assert_eq!(handle.toggle().await, Ok(false));
        assert_eq!(handle.session().authorization, AuthorizationState::Unknown);
        assert!(speech.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_announces_immediately_then_on_each_minute() {
        let h = spawn_authorized_at(14, 59, 30);
        h.handle.authorization().await.unwrap();

        assert_eq!(h.handle.toggle().await, Ok(true));
        tokio::time::sleep(Duration::from_secs(155)).await;

        assert_eq!(spoken_offsets(&h), [0, 30, 90, 150]);
        let texts: Vec<String> = h.speech.spoken().into_iter().map(|(_, u)| u.text).collect();
        assert_eq!(
            texts,
            [
                "The time is 2:59 PM",
                "The time is 3:00 PM",
                "The time is 3:01 PM",
                "The time is 3:02 PM",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_utterance_uses_selected_voice_and_assistive_settings() {
        let h = spawn_authorized_at(8, 0, 10);
        h.handle.authorization().await.unwrap();
        assert_eq!(h.handle.select_voice("personal:ana").await, Ok(true));

        h.handle.toggle().await.unwrap();
        let (_, utterance) = h.speech.spoken().remove(0);
        assert_eq!(utterance.voice_id.as_deref(), Some("personal:ana"));
        assert!(utterance.prefers_assistive_technology_settings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_toggle_restores_state_and_clears_schedule() {
        let h = spawn_authorized_at(10, 0, 5);
        h.handle.authorization().await.unwrap();

        assert_eq!(h.handle.toggle().await, Ok(true));
        assert_eq!(h.handle.toggle().await, Ok(false));
        assert!(!h.handle.session().is_active);
        assert_eq!(h.speech.stops(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(spoken_offsets(&h), [0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_announcements_after_deactivation() {
        let h = spawn_authorized_at(10, 0, 45);
        h.handle.authorization().await.unwrap();

        h.handle.toggle().await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(spoken_offsets(&h), [0, 15]);

        h.handle.toggle().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(spoken_offsets(&h), [0, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_voice_at_announce_stops_session() {
        let h = spawn_authorized_at(12, 0, 30);
        h.handle.authorization().await.unwrap();
        h.handle.toggle().await.unwrap();

        h.catalog.remove("personal:luke");
        let mut state = h.handle.subscribe();
        let session = state.wait_for(|s| !s.is_active).await.unwrap().clone();

        assert!(!session.is_active);
        assert!(session.invariant_holds());
        assert_eq!(spoken_offsets(&h), [0]);
        assert_eq!(h.speech.stops(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(spoken_offsets(&h), [0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_voice_on_activation_never_schedules() {
        let h = spawn_authorized_at(12, 0, 30);
        h.handle.authorization().await.unwrap();
        h.catalog.remove("personal:luke");

        assert_eq!(h.handle.toggle().await, Ok(false));
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert!(h.speech.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_voice_rejects_unknown_ids() {
        let h = spawn_authorized_at(12, 0, 0);
        h.handle.authorization().await.unwrap();

        assert_eq!(h.handle.select_voice("en-us").await, Ok(false));
        assert_eq!(h.handle.select_voice("personal:nobody").await, Ok(false));
        assert_eq!(h.handle.select_voice("personal:luke").await, Ok(false));
        assert_eq!(h.handle.session().selected_voice_id.as_deref(), Some("personal:luke"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calendar_failure_falls_back_to_fixed_interval() {
        let h = spawn_with(
            AuthorizationOutcome::Authorized,
            personal_voices(),
            Arc::new(FixedClock(DateTime::<Utc>::MAX_UTC)),
        );
        h.handle.authorization().await.unwrap();

        h.handle.toggle().await.unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(spoken_offsets(&h), [0, 60, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invariant_holds_over_command_sequence() {
        let h = spawn_authorized_at(23, 59, 50);
        let mut state = h.handle.subscribe();

        for _ in 0..3 {
            h.handle.toggle().await.unwrap();
            assert!(state.borrow_and_update().invariant_holds());
        }
        h.handle.authorization().await.unwrap();
        for id in ["personal:ana", "missing", "personal:luke"] {
            h.handle.select_voice(id).await.unwrap();
            h.handle.toggle().await.unwrap();
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert!(state.borrow_and_update().invariant_holds());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_stops_controller() {
        let h = spawn_authorized_at(7, 0, 0);
        h.handle.authorization().await.unwrap();
        h.handle.toggle().await.unwrap();

        let mut observer = h.handle.subscribe();
        observer.borrow_and_update();
        let speech = h.speech.clone();
        drop(h);

        // The state sender is dropped only when the controller task has ended,
        // after it published the final inactive session.
        while observer.changed().await.is_ok() {}
        assert!(!observer.borrow().is_active);
        assert_eq!(speech.stops(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(speech.spoken().len(), 1);
        assert_eq!(speech.stops(), 1);
    }

    /// Catalog whose listing blocks the calling thread, like shelling out to
    /// `espeak-ng --voices`.
    struct SlowCatalog {
        delay: Duration,
        voices: Vec<VoiceDescriptor>,
    }

    impl VoiceCatalog for SlowCatalog {
        fn voices(&self) -> Vec<VoiceDescriptor> {
            std::thread::sleep(self.delay);
            self.voices.clone()
        }

        fn resolve(&self, id: &str) -> Option<VoiceDescriptor> {
            self.voices.iter().find(|v| v.id == id).cloned()
        }
    }

    #[tokio::test]
    async fn test_slow_voice_listing_does_not_block_runtime() {
        let speech = Arc::new(RecordingSpeech::default());
        let collaborators = Collaborators {
            speech: speech.clone(),
            catalog: Arc::new(SlowCatalog {
                delay: Duration::from_millis(1500),
                voices: personal_voices(),
            }),
            clock: Arc::new(PausedClock::at(10, 0, 30)),
            calendar: Calendar::new(Zone::Named(chrono_tz::UTC), TimeFormat::TwelveHour),
        };
        let handle =
            AnnouncementController::spawn(collaborators, Arc::new(FixedAuthorizer(AuthorizationOutcome::Authorized)));

        // Give the authorization task time to start listing voices.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_millis(700), "runtime stalled for {:?}", started.elapsed());

        // The controller keeps answering while the listing is in flight.
        let started = std::time::Instant::now();
        assert_eq!(handle.toggle().await, Ok(false));
        assert!(started.elapsed() < Duration::from_millis(700), "controller stalled for {:?}", started.elapsed());

        assert_eq!(handle.authorization().await, Ok(AuthorizationState::Authorized));
        assert_eq!(handle.session().available_voices.len(), 2);
        assert_eq!(handle.toggle().await, Ok(true));
        assert_eq!(speech.spoken().len(), 1);
    }
}
