use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TrackerError,
    identity::IdentityProvider,
    models::{ActiveSession, NewSession, SessionUpdate},
    notify::{NotificationPermission, Notifier, COMPLETION_BODY, COMPLETION_TITLE},
    settings::TrackerSettings,
    store::SessionStore,
    utils::format_clock,
};

use super::{
    clock::{Clock, SystemClock},
    state::{
        assess_liveness, normalize_tag, ActiveState, AutoStop, Liveness, SessionMode,
        TrackerState, TrackerStatus,
    },
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const LOAD_FAILED_MESSAGE: &str = "Could not read session data.";
const RECOVERED_MESSAGE: &str =
    "A previous session was left open and has been closed at its last recorded activity.";
const RECOVERY_FAILED_MESSAGE: &str = "A previous session could not be closed:";
const COMPLETED_NOTIFIED_MESSAGE: &str = "Pomodoro complete. The session was ended automatically.";
const COMPLETED_SILENT_MESSAGE: &str = "Pomodoro time is up. The session was ended automatically.";

/// Render-ready view of the tracker.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub status: TrackerStatus,
    pub session: Option<ActiveSession>,
    pub elapsed_seconds: u64,
    pub display_seconds: u64,
    pub clock: String,
    pub completion_percent: Option<u8>,
    pub auto_stop: Option<AutoStop>,
    pub saving: bool,
    pub status_message: Option<String>,
    pub notification_permission: NotificationPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub mode: SessionMode,
    pub tag: Option<String>,
}

impl StartRequest {
    pub fn manual() -> Self {
        Self {
            mode: SessionMode::Manual,
            tag: None,
        }
    }

    pub fn preset(minutes: u32) -> Self {
        Self {
            mode: SessionMode::Preset(minutes),
            tag: None,
        }
    }

    pub fn custom(minutes: u32) -> Self {
        Self {
            mode: SessionMode::Custom(minutes),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Recorded instead of the live elapsed time.
    pub duration_seconds: Option<u64>,
    /// Shown after a successful stop.
    pub completion_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped {
        session_id: String,
        duration_seconds: u64,
    },
    /// Nothing active, or another start/stop was in flight. No write issued.
    Ignored,
}

struct Inner {
    state: TrackerState,
    saving: bool,
    status_message: Option<String>,
    permission: NotificationPermission,
}

struct Timers {
    mount_token: CancellationToken,
    session_token: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

impl Timers {
    fn disarm(&mut self) {
        if let Some(token) = self.session_token.take() {
            token.cancel();
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

struct Core {
    inner: Mutex<Inner>,
    timers: Mutex<Timers>,
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
}

impl Drop for Core {
    fn drop(&mut self) {
        let timers = self.timers.get_mut();
        timers.mount_token.cancel();
        timers.disarm();
    }
}

/// Owns the lifecycle of at most one active study session for the signed-in
/// user.
///
/// Call [`mount`](Self::mount) once the surface hosting the tracker appears
/// and [`unmount`](Self::unmount) when it goes away. While a session is
/// active a display tick and a heartbeat run in background tasks; both are
/// cancelled whenever the tracker returns to idle or is unmounted.
#[derive(Clone)]
pub struct SessionTracker {
    core: Arc<Core>,
}

impl SessionTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        settings: TrackerSettings,
    ) -> Self {
        Self::with_clock(store, identity, notifier, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        settings: TrackerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let permission = notifier.permission();
        Self {
            core: Arc::new(Core {
                inner: Mutex::new(Inner {
                    state: TrackerState::Loading,
                    saving: false,
                    status_message: None,
                    permission,
                }),
                timers: Mutex::new(Timers {
                    mount_token: CancellationToken::new(),
                    session_token: None,
                    handles: Vec::new(),
                }),
                store,
                identity,
                notifier,
                clock,
                settings,
            }),
        }
    }

    fn upgrade(core: &Weak<Core>) -> Option<Self> {
        core.upgrade().map(|core| Self { core })
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.core.settings
    }

    pub async fn state(&self) -> TrackerState {
        self.core.inner.lock().await.state.clone()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let inner = self.core.inner.lock().await;
        let active = inner.state.active();
        let display_seconds = active.map_or(0, ActiveState::display_seconds);

        TrackerSnapshot {
            status: inner.state.status(),
            session: active.map(|active| active.session.clone()),
            elapsed_seconds: active.map_or(0, |active| active.elapsed_seconds),
            display_seconds,
            clock: format_clock(display_seconds.min(i64::MAX as u64) as i64),
            completion_percent: active.and_then(ActiveState::completion_percent),
            auto_stop: active.map(|active| active.auto_stop),
            saving: inner.saving,
            status_message: inner.status_message.clone(),
            notification_permission: inner.permission,
        }
    }

    /// Loads the user's open session, closing it first if it was abandoned.
    /// Timers are armed only after that decision.
    pub async fn mount(&self) -> TrackerSnapshot {
        {
            let mut timers = self.core.timers.lock().await;
            if timers.mount_token.is_cancelled() {
                timers.mount_token = CancellationToken::new();
            }
            timers.disarm();
        }

        {
            let mut inner = self.core.inner.lock().await;
            inner.state = TrackerState::Loading;
            inner.status_message = None;
            inner.permission = self.core.notifier.permission();
        }

        let (state, message) = self.load_active().await;
        let resumed_id = state.active().map(|active| active.session.id.clone());

        {
            let mut inner = self.core.inner.lock().await;
            inner.state = state;
            inner.status_message = message;
        }

        if let Some(session_id) = resumed_id {
            self.arm_timers(&session_id).await;
        }

        self.snapshot().await
    }

    async fn load_active(&self) -> (TrackerState, Option<String>) {
        let Some(user) = self.core.identity.current_user().await else {
            return (
                TrackerState::Idle,
                Some(TrackerError::IdentityUnavailable.to_string()),
            );
        };

        let candidate = match self.core.store.find_active(&user.id).await {
            Ok(candidate) => candidate,
            Err(err) => {
                log_warn!("Failed to load active session for {}: {err:#}", user.id);
                return (TrackerState::Idle, Some(LOAD_FAILED_MESSAGE.to_string()));
            }
        };

        let Some(session) = candidate else {
            return (TrackerState::Idle, None);
        };

        let now = self.core.clock.now();
        match assess_liveness(&session, now, self.core.settings.stale_after()) {
            Liveness::Fresh => {
                log_info!("Resuming study session {}", session.id);
                (
                    TrackerState::Active(ActiveState::new(session.into(), now)),
                    None,
                )
            }
            Liveness::Stale {
                ended_at,
                duration_seconds,
            } => {
                log_warn!(
                    "Recovered abandoned session {}; closing at {} after {}s",
                    session.id,
                    ended_at,
                    duration_seconds
                );
                let update = SessionUpdate::Finish {
                    ended_at,
                    duration_seconds,
                };
                match self.core.store.update(&session.id, update).await {
                    Ok(()) => (TrackerState::Idle, Some(RECOVERED_MESSAGE.to_string())),
                    Err(err) => {
                        log_error!("Failed to close abandoned session {}: {err:#}", session.id);
                        (
                            TrackerState::Idle,
                            Some(format!("{RECOVERY_FAILED_MESSAGE} {err}")),
                        )
                    }
                }
            }
        }
    }

    pub async fn start(&self, request: StartRequest) -> Result<ActiveSession, TrackerError> {
        let planned = match request.mode.planned_duration_seconds(&self.core.settings) {
            Ok(planned) => planned,
            Err(err) => {
                self.core.inner.lock().await.status_message = Some(err.to_string());
                return Err(err);
            }
        };

        if !self.is_mounted().await {
            return Err(TrackerError::NotReady);
        }

        {
            let mut inner = self.core.inner.lock().await;
            match inner.state {
                TrackerState::Loading => return Err(TrackerError::NotReady),
                TrackerState::Active(_) => return Err(TrackerError::AlreadyActive),
                TrackerState::Idle => {}
            }
            if inner.saving {
                return Err(TrackerError::Busy);
            }
            inner.saving = true;
            inner.status_message = None;
        }

        let created = self.create_session(&request, planned).await;
        let mounted = self.is_mounted().await;

        let session = {
            let mut inner = self.core.inner.lock().await;
            inner.saving = false;
            match created {
                Ok(session) => session,
                Err(err) => {
                    inner.status_message = Some(err.to_string());
                    return Err(err);
                }
            }
        };

        let active: ActiveSession = session.into();
        if !mounted {
            log_warn!(
                "Tracker unmounted while starting session {}; leaving it to the next load",
                active.id
            );
            return Ok(active);
        }

        {
            let mut inner = self.core.inner.lock().await;
            inner.state =
                TrackerState::Active(ActiveState::new(active.clone(), self.core.clock.now()));
        }
        self.arm_timers(&active.id).await;

        log_info!(
            "Started {} session {} (planned: {:?})",
            active.source_type.as_str(),
            active.id,
            active.planned_duration_seconds
        );
        Ok(active)
    }

    async fn create_session(
        &self,
        request: &StartRequest,
        planned: Option<u64>,
    ) -> Result<crate::models::StudySession, TrackerError> {
        if request.mode.is_timed() {
            let current = self.core.inner.lock().await.permission;
            if current == NotificationPermission::Default {
                let decided = self.core.notifier.request_permission().await;
                self.core.inner.lock().await.permission = decided;
            }
        }

        let user = self
            .core
            .identity
            .current_user()
            .await
            .ok_or(TrackerError::IdentityUnavailable)?;

        let now = self.core.clock.now();
        let new = NewSession {
            user_id: user.id,
            source_type: request.mode.source_type(),
            started_at: now,
            updated_at: now,
            planned_duration_seconds: planned,
            tag: normalize_tag(request.tag.as_deref(), self.core.settings.tag_max_chars),
        };

        self.core.store.create(new).await.map_err(|err| {
            log_warn!("Failed to start study session: {err:#}");
            TrackerError::store(err)
        })
    }

    pub async fn stop(&self) -> Result<StopOutcome, TrackerError> {
        self.stop_with(StopOptions::default()).await
    }

    pub async fn stop_with(&self, options: StopOptions) -> Result<StopOutcome, TrackerError> {
        self.stop_session(None, options).await
    }

    async fn stop_session(
        &self,
        expected_id: Option<&str>,
        options: StopOptions,
    ) -> Result<StopOutcome, TrackerError> {
        let now = self.core.clock.now();

        let (session_id, duration_seconds, completion_message) = {
            let mut guard = self.core.inner.lock().await;
            let inner = &mut *guard;
            if inner.saving {
                return Ok(StopOutcome::Ignored);
            }
            let TrackerState::Active(active) = &mut inner.state else {
                return Ok(StopOutcome::Ignored);
            };
            if expected_id.is_some_and(|expected| expected != active.session.id) {
                return Ok(StopOutcome::Ignored);
            }

            active.sync_elapsed(now);
            let duration_seconds = options
                .duration_seconds
                .unwrap_or_else(|| active.stop_duration());
            let session_id = active.session.id.clone();
            let completion_message = options
                .completion_message
                .or_else(|| active.completion_message.clone());

            inner.saving = true;
            if completion_message.is_none() {
                inner.status_message = None;
            }
            (session_id, duration_seconds, completion_message)
        };

        let update = SessionUpdate::Finish {
            ended_at: now,
            duration_seconds,
        };
        if let Err(err) = self.core.store.update(&session_id, update).await {
            log_warn!("Failed to stop session {session_id}: {err:#}");
            let err = TrackerError::store(err);
            let mut inner = self.core.inner.lock().await;
            inner.saving = false;
            inner.status_message = Some(err.to_string());
            return Err(err);
        }

        {
            let mut inner = self.core.inner.lock().await;
            inner.saving = false;
            if inner.state.active_for(&session_id).is_some() {
                inner.state = TrackerState::Idle;
            }
            inner.status_message = completion_message;
        }
        self.disarm_timers().await;

        log_info!("Stopped session {session_id} after {duration_seconds}s");
        Ok(StopOutcome::Stopped {
            session_id,
            duration_seconds,
        })
    }

    /// Cancels all timers. In-flight start/stop calls still finish but no
    /// timer is armed again until the next [`mount`](Self::mount).
    pub async fn unmount(&self) {
        let mut timers = self.core.timers.lock().await;
        timers.mount_token.cancel();
        timers.disarm();
        log_debug!("Session tracker unmounted");
    }

    async fn is_mounted(&self) -> bool {
        !self.core.timers.lock().await.mount_token.is_cancelled()
    }

    async fn arm_timers(&self, session_id: &str) {
        let mut timers = self.core.timers.lock().await;
        timers.disarm();
        if timers.mount_token.is_cancelled() {
            return;
        }

        let token = timers.mount_token.child_token();
        let core = Arc::downgrade(&self.core);

        timers.handles.push(tokio::spawn(display_tick_loop(
            core.clone(),
            session_id.to_string(),
            self.core.settings.tick_interval(),
            token.clone(),
        )));
        timers.handles.push(tokio::spawn(heartbeat_loop(
            core,
            session_id.to_string(),
            self.core.settings.heartbeat_interval(),
            token.clone(),
        )));
        timers.session_token = Some(token);
    }

    async fn disarm_timers(&self) {
        self.core.timers.lock().await.disarm();
    }

    /// Returns `false` once the session is no longer the active one.
    async fn on_tick(&self, session_id: &str) -> bool {
        let now = self.core.clock.now();
        let trigger = {
            let mut guard = self.core.inner.lock().await;
            let inner = &mut *guard;
            let Some(active) = inner.state.active_for(session_id) else {
                return false;
            };
            active.sync_elapsed(now);
            let Some(planned) = active.try_trigger_auto_stop() else {
                return true;
            };

            // Recorded under the same lock as the trigger so that a stop
            // racing the spawned auto-stop still reports completion.
            let (permission, message) = self.announce_completion();
            active.completion_message = Some(message.to_string());
            inner.permission = permission;
            Some((planned, message))
        };

        if let Some((planned, message)) = trigger {
            self.spawn_auto_stop(session_id, planned, message);
        }
        true
    }

    /// Sends the completion notification when allowed and picks the matching
    /// status message.
    fn announce_completion(&self) -> (NotificationPermission, &'static str) {
        let permission = self.core.notifier.permission();
        if permission != NotificationPermission::Granted {
            return (permission, COMPLETED_SILENT_MESSAGE);
        }
        match self.core.notifier.notify(COMPLETION_TITLE, COMPLETION_BODY) {
            Ok(()) => (permission, COMPLETED_NOTIFIED_MESSAGE),
            Err(err) => {
                log_warn!("Completion notification failed: {err:#}");
                (permission, COMPLETED_SILENT_MESSAGE)
            }
        }
    }

    fn spawn_auto_stop(&self, session_id: &str, planned: u64, message: &'static str) {
        log_info!("Session {session_id} reached its planned {planned}s; stopping");

        // Runs outside the tick task so disarming the tick cannot cancel it.
        let tracker = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let options = StopOptions {
                duration_seconds: Some(planned),
                completion_message: Some(message.to_string()),
            };
            if let Err(err) = tracker.stop_session(Some(&session_id), options).await {
                log_warn!("Auto-stop of session {session_id} failed: {err}");
            }
        });
    }

    async fn on_heartbeat(&self, session_id: &str) -> bool {
        {
            let mut inner = self.core.inner.lock().await;
            let saving = inner.saving;
            if inner.state.active_for(session_id).is_none() {
                return false;
            }
            if saving {
                return true;
            }
        }

        let now = self.core.clock.now();
        let update = SessionUpdate::Heartbeat { updated_at: now };
        match self.core.store.update(session_id, update).await {
            Ok(()) => {
                let mut inner = self.core.inner.lock().await;
                if let Some(active) = inner.state.active_for(session_id) {
                    active.session.updated_at = Some(now);
                }
                log_debug!("Heartbeat recorded for session {session_id}");
            }
            Err(err) => {
                log_debug!("Heartbeat for session {session_id} failed: {err:#}");
            }
        }
        true
    }
}

async fn display_tick_loop(
    core: Weak<Core>,
    session_id: String,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(tracker) = SessionTracker::upgrade(&core) else {
                    break;
                };
                if !tracker.on_tick(&session_id).await {
                    break;
                }
            }
        }
    }
}

async fn heartbeat_loop(
    core: Weak<Core>,
    session_id: String,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(tracker) = SessionTracker::upgrade(&core) else {
                    break;
                };
                if !tracker.on_heartbeat(&session_id).await {
                    break;
                }
            }
        }
    }
}
