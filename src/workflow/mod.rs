//! Generation workflow: submit a video, poll the job, fetch the script.
//!
//! A [`GenerationController`] owns one attempt at a time and moves it through
//! `Idle -> Processing -> Completed | Failed`. While processing, a background
//! ticker checks the job status on a fixed interval. Every status response is
//! applied under a guard on the current attempt and state, so late responses
//! from overlapping or cancelled polls can never move the state backwards.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::api::{ApiError, Artifact, GenerationRequest, JobHandle, JobService};
use crate::validator;
use crate::GenerationError;

mod poller;


/// Which view of the workflow is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    #[default]
    Idle,
    Processing,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Processing => write!(f, "processing"),
            WorkflowState::Completed => write!(f, "completed"),
            WorkflowState::Failed => write!(f, "failed"),
        }
    }
}

/// How often and for how long a running job is polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between two status checks
    pub interval: Duration,

    /// Give up after this many status checks
    pub max_attempts: Option<u32>,

    /// Give up once the attempt has been processing this long
    pub max_duration: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
            max_duration: Some(Duration::from_secs(30 * 60)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Short-lived, user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

/// Copy of the controller state at one point in time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub state: WorkflowState,

    /// URL being (or about to be) transcribed
    pub video_url: String,

    /// Job progress in percent
    pub progress: u8,

    /// Latest status message, or the failure message once failed
    pub message: String,

    pub job: Option<JobHandle>,

    /// Always present once completed
    pub artifact: Option<Artifact>,

    /// Why the attempt failed
    pub failure: Option<GenerationError>,

    /// Set when the finished script could not be fetched and a placeholder is shown
    pub fetch_error: Option<GenerationError>,
}

impl Snapshot {
    /// Nothing left to wait for
    pub fn is_settled(&self) -> bool {
        match self.state {
            WorkflowState::Completed => self.artifact.is_some(),
            WorkflowState::Failed => true,
            _ => false,
        }
    }
}

/// Mutable state of the current attempt. Only touched with the lock held.
#[derive(Default)]
struct Session {
    view: Snapshot,
    /// Identity of the current attempt; results tagged with another one are stale
    attempt: Option<Uuid>,
    /// A completed status was accepted and the script fetch is underway
    resolving: bool,
    ticker: Option<JoinHandle<()>>,
    polls_issued: u32,
    started_at: Option<Instant>,
}

impl Session {
    fn begin(&mut self, video_url: &str, message: &str) -> Uuid {
        self.stop_ticker();

        let attempt = Uuid::new_v4();
        *self = Session {
            view: Snapshot {
                state: WorkflowState::Processing,
                video_url: video_url.to_string(),
                message: message.to_string(),
                ..Snapshot::default()
            },
            attempt: Some(attempt),
            started_at: Some(Instant::now()),
            ..Session::default()
        };
        attempt
    }

    fn is_current(&self, attempt: Uuid) -> bool {
        self.attempt == Some(attempt)
    }

    fn accepts_poll(&self, attempt: Uuid) -> bool {
        self.is_current(attempt) && self.view.state == WorkflowState::Processing && !self.resolving
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

struct Inner {
    service: Arc<dyn JobService>,
    policy: PollPolicy,
    session: Mutex<Session>,
    snapshots: watch::Sender<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.snapshots.send_replace(session.view.clone());
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine
        let _ = self.notices.send(notice);
    }

    /// Move the locked session to `Failed` and tell everyone about it
    fn finish_failed(&self, session: &mut Session, failure: GenerationError) {
        session.stop_ticker();
        session.resolving = false;
        session.view.state = WorkflowState::Failed;
        session.view.message = failure.to_string();
        session.view.failure = Some(failure.clone());

        tracing::warn!(attempt = ?session.attempt, "Generation failed: {}", failure);
        self.publish(session);
        self.notify(Notice::error(failure.to_string()));
    }

    /// Fail `attempt` unless it is stale or already settled
    fn fail(&self, attempt: Uuid, failure: GenerationError) {
        let mut session = self.session();
        if !session.is_current(attempt) || session.view.state.is_terminal() {
            tracing::debug!(%attempt, "Ignoring failure for settled attempt: {}", failure);
            return;
        }
        self.finish_failed(&mut session, failure);
    }

    fn start_polling(self: &Arc<Self>, session: &mut Session, attempt: Uuid, handle: JobHandle) {
        tracing::info!(%attempt, task_id = %handle.task_id, "Polling job every {:?}", self.policy.interval);

        session.stop_ticker();
        session.view.job = Some(handle.clone());
        session.ticker = Some(tokio::spawn(poller::run(
            Arc::downgrade(self),
            attempt,
            handle.task_id,
        )));
        self.publish(session);
    }
}

/// Drives one generation attempt at a time against a [`JobService`].
///
/// Cloning yields another handle on the same controller.
#[derive(Clone)]
pub struct GenerationController {
    inner: Arc<Inner>,
}

impl GenerationController {
    pub fn new(service: Arc<dyn JobService>, policy: PollPolicy) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        let (notices, _) = broadcast::channel(32);

        Self {
            inner: Arc::new(Inner {
                service,
                policy,
                session: Mutex::new(Session::default()),
                snapshots,
                notices,
            }),
        }
    }

    /// Pre-fill the URL field without submitting it
    pub fn with_initial_url(self, video_url: impl Into<String>) -> Self {
        {
            let mut session = self.inner.session();
            session.view.video_url = video_url.into();
            self.inner.publish(&session);
        }
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.snapshots.borrow().state
    }

    /// Receive a fresh [`Snapshot`] after every state change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Validate and submit a video for transcription, then start polling.
    ///
    /// Only allowed while idle. An invalid URL leaves the controller idle; a
    /// failed submission moves it to `Failed`.
    pub async fn submit(&self, video_url: &str) -> Result<JobHandle, GenerationError> {
        let video_url = video_url.trim();

        let attempt = {
            let mut session = self.inner.session();
            if session.view.state != WorkflowState::Idle {
                return Err(GenerationError::Busy(session.view.state));
            }

            if !validator::is_valid_video_url(video_url) {
                let err = GenerationError::InvalidUrl(video_url.to_string());
                session.view.video_url = video_url.to_string();
                self.inner.publish(&session);
                self.inner.notify(Notice::error(err.to_string()));
                return Err(err);
            }

            let attempt = session.begin(video_url, "Starting transcription...");
            self.inner.publish(&session);
            attempt
        };

        tracing::info!(
            %attempt,
            video_id = validator::video_id(video_url).unwrap_or_default(),
            "Submitting {} for transcription",
            video_url
        );
        let submitted = self
            .inner
            .service
            .submit(&GenerationRequest::new(video_url))
            .await;

        let mut session = self.inner.session();
        if !session.is_current(attempt) {
            tracing::debug!(%attempt, "Attempt was reset during submission");
            return Err(GenerationError::Cancelled);
        }

        match submitted {
            Ok(handle) => {
                self.inner.start_polling(&mut session, attempt, handle.clone());
                Ok(handle)
            }
            Err(err) => {
                tracing::error!("Submission failed: {}", err);
                let failure = match err {
                    ApiError::Unauthorized { .. } => GenerationError::SessionExpired,
                    other => GenerationError::Submission(
                        other
                            .user_message()
                            .unwrap_or_else(|| "Failed to start transcription".to_string()),
                    ),
                };
                self.inner.finish_failed(&mut session, failure.clone());
                Err(failure)
            }
        }
    }

    /// Start following a job that already exists on the service
    pub fn attach(&self, handle: JobHandle, video_url: impl Into<String>) -> Result<(), GenerationError> {
        let mut session = self.inner.session();
        if session.view.state != WorkflowState::Idle {
            return Err(GenerationError::Busy(session.view.state));
        }

        let video_url: String = video_url.into();
        let attempt = session.begin(&video_url, "Waiting for job status...");
        self.inner.start_polling(&mut session, attempt, handle);
        Ok(())
    }

    /// Drop the current attempt, whatever its state, and go back to idle
    pub fn reset(&self) {
        let mut session = self.inner.session();
        session.stop_ticker();
        *session = Session::default();
        self.inner.publish(&session);
        tracing::info!("Generation reset");
    }

    /// Wait until the current attempt settles (or the controller is idle)
    pub async fn wait_for_outcome(&self) -> Snapshot {
        let mut updates = self.subscribe();
        loop {
            {
                let current = updates.borrow_and_update();
                if current.is_settled() || current.state == WorkflowState::Idle {
                    return current.clone();
                }
            }

            if updates.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}
