#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use studydesk::models::{NewSession, SessionUpdate};
use studydesk::notify::NotificationPermission;
use studydesk::timer::Clock;
use studydesk::{
    MemoryStore, Notifier, SessionStore, SessionTracker, StaticIdentity, StudySession,
    TrackerSettings,
};

pub const USER: &str = "user-1";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 16, 9, 0, 0).unwrap()
}

/// Wall clock that advances with tokio's (paused) time.
pub struct TestClock {
    base: DateTime<Utc>,
    origin: Instant,
    skew: Mutex<chrono::Duration>,
}

impl TestClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: base_time(),
            origin: Instant::now(),
            skew: Mutex::new(chrono::Duration::zero()),
        })
    }

    pub fn skew(&self, by: chrono::Duration) {
        *self.skew.lock().unwrap() = by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap();
        self.base + elapsed + *self.skew.lock().unwrap()
    }
}

/// `MemoryStore` with switchable failures, an optional slow finish, and
/// call counters.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_find: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_finish: AtomicBool,
    pub fail_heartbeat: AtomicBool,
    pub finish_delay: Mutex<Option<Duration>>,
    pub create_calls: AtomicUsize,
    pub finish_calls: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_sessions(sessions: Vec<StudySession>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_sessions(sessions),
            ..Self::default()
        })
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn slow_finish(&self, delay: Duration) {
        *self.finish_delay.lock().unwrap() = Some(delay);
    }

    pub fn finishes(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    pub fn only_session(&self) -> StudySession {
        let all = self.inner.all();
        assert_eq!(all.len(), 1, "expected exactly one stored session");
        all.into_iter().next().unwrap()
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn find_active(&self, user_id: &str) -> Result<Option<StudySession>> {
        if self.fail_find.load(Ordering::SeqCst) {
            bail!("relation study_sessions does not exist");
        }
        self.inner.find_active(user_id).await
    }

    async fn create(&self, new: NewSession) -> Result<StudySession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("insert rejected by server");
        }
        self.inner.create(new).await
    }

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        match update {
            SessionUpdate::Heartbeat { .. } => {
                self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_heartbeat.load(Ordering::SeqCst) {
                    bail!("heartbeat rejected");
                }
            }
            SessionUpdate::Finish { .. } => {
                self.finish_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.finish_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_finish.load(Ordering::SeqCst) {
                    bail!("connection lost");
                }
            }
        }
        self.inner.update(session_id, update).await
    }
}

type NotifyHook = Box<dyn Fn() + Send + Sync>;

pub struct RecordingNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: bool,
    pub requests: AtomicUsize,
    pub notifications: Mutex<Vec<(String, String)>>,
    on_notify: Mutex<Option<NotifyHook>>,
}

impl RecordingNotifier {
    pub fn new(permission: NotificationPermission) -> Arc<Self> {
        Self::with_answer(permission, true)
    }

    pub fn with_answer(permission: NotificationPermission, grant_on_request: bool) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            grant_on_request,
            requests: AtomicUsize::new(0),
            notifications: Mutex::new(Vec::new()),
            on_notify: Mutex::new(None),
        })
    }

    /// Runs `hook` synchronously inside every `notify` call.
    pub fn on_notify(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_notify.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn sent(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn requested(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> NotificationPermission {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let decided = if self.grant_on_request {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        };
        *self.permission.lock().unwrap() = decided;
        decided
    }

    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        if let Some(hook) = self.on_notify.lock().unwrap().as_ref() {
            hook();
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<FaultyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<TestClock>,
    pub tracker: SessionTracker,
}

pub fn harness(store: Arc<FaultyStore>, notifier: Arc<RecordingNotifier>) -> Harness {
    harness_for(store, notifier, Arc::new(StaticIdentity::signed_in(USER)))
}

pub fn harness_for(
    store: Arc<FaultyStore>,
    notifier: Arc<RecordingNotifier>,
    identity: Arc<StaticIdentity>,
) -> Harness {
    let clock = TestClock::new();
    let tracker = SessionTracker::with_clock(
        store.clone(),
        identity,
        notifier.clone(),
        TrackerSettings::default(),
        clock.clone(),
    );
    Harness {
        store,
        notifier,
        clock,
        tracker,
    }
}

pub fn open_row(id: &str, started_at: DateTime<Utc>, updated_at: Option<DateTime<Utc>>) -> StudySession {
    StudySession {
        id: id.into(),
        user_id: USER.into(),
        source_type: studydesk::SourceType::Manual,
        started_at,
        updated_at,
        ended_at: None,
        duration_seconds: 0,
        planned_duration_seconds: None,
        tag: None,
        notes: String::new(),
        created_at: started_at,
    }
}

pub async fn sleep_secs(seconds: f64) {
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
}
