use std::sync::{Arc, Weak};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{Inner, Notice, WorkflowState};
use crate::api::{ApiError, Artifact, PollResult};
use crate::GenerationError;

enum Gate {
    /// Issue status check number `n`
    Poll(u32),
    /// The polling budget is used up
    Exhausted(u32),
    /// The attempt is no longer processing
    Stop,
}

/// Fire a status check every `policy.interval` until the attempt leaves
/// `Processing`. Ticks are not chained to responses: a slow request does not
/// delay the next one.
pub(super) async fn run(controller: Weak<Inner>, attempt: Uuid, task_id: String) {
    let period = match controller.upgrade() {
        Some(inner) => inner.policy.interval.max(Duration::from_millis(1)),
        None => return,
    };

    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticks.tick().await;

        let Some(inner) = controller.upgrade() else {
            break;
        };

        match inner.gate(attempt) {
            Gate::Poll(seq) => {
                tokio::spawn(poll_once(inner.clone(), attempt, task_id.clone(), seq));
            }
            Gate::Exhausted(polls) => {
                inner.fail(attempt, GenerationError::TimedOut { polls });
                break;
            }
            Gate::Stop => break,
        }
    }

    tracing::debug!(%attempt, "Poll ticker stopped");
}

async fn poll_once(inner: Arc<Inner>, attempt: Uuid, task_id: String, seq: u32) {
    tracing::debug!(%task_id, seq, "Checking job status");

    match inner.service.poll_status(&task_id).await {
        Ok(result) => inner.apply_poll(attempt, result).await,
        Err(ApiError::Unauthorized { .. }) => inner.fail(attempt, GenerationError::SessionExpired),
        Err(err) => {
            let err = GenerationError::Transport(err.to_string());
            tracing::warn!(%task_id, seq, "{}; retrying on next tick", err);
        }
    }
}

impl Inner {
    fn gate(&self, attempt: Uuid) -> Gate {
        let mut session = self.session();
        if !session.accepts_poll(attempt) {
            return Gate::Stop;
        }

        if let Some(max) = self.policy.max_attempts {
            if session.polls_issued >= max {
                return Gate::Exhausted(session.polls_issued);
            }
        }

        if let (Some(max), Some(started)) = (self.policy.max_duration, session.started_at) {
            if started.elapsed() >= max {
                return Gate::Exhausted(session.polls_issued);
            }
        }

        session.polls_issued += 1;
        Gate::Poll(session.polls_issued)
    }

    /// Apply one status response to the attempt it was issued for
    pub(super) async fn apply_poll(self: &Arc<Self>, attempt: Uuid, result: PollResult) {
        let (script_id, video_url) = {
            let mut session = self.session();
            if !session.accepts_poll(attempt) {
                tracing::debug!(%attempt, status = result.status(), "Discarding stale status response");
                return;
            }

            let update = result.update();
            session.view.progress = update.progress;
            session.view.message = update.message.clone();

            if let Some(id) = &update.script_id {
                if let Some(job) = session.view.job.as_mut() {
                    if job.script_id.is_none() {
                        job.script_id = Some(id.clone());
                    }
                }
            }

            match &result {
                PollResult::Processing(_) => {
                    self.publish(&session);
                    return;
                }
                PollResult::Failed(update) => {
                    let message = if update.message.trim().is_empty() {
                        "Transcription failed".to_string()
                    } else {
                        update.message.clone()
                    };
                    self.finish_failed(&mut session, GenerationError::JobFailed(message));
                    return;
                }
                PollResult::Completed(update) => {
                    let known = session.view.job.as_ref().and_then(|job| job.script_id.clone());
                    match update.script_id.clone().or(known) {
                        Some(id) => {
                            session.resolving = true;
                            session.stop_ticker();
                            self.publish(&session);
                            (id, session.view.video_url.clone())
                        }
                        None => {
                            self.finish_failed(&mut session, GenerationError::MissingScriptId);
                            return;
                        }
                    }
                }
            }
        };

        tracing::info!(%attempt, %script_id, "Job completed; fetching script");
        let fetched = self.service.fetch_artifact(&script_id).await;

        let mut session = self.session();
        if !session.is_current(attempt) {
            tracing::debug!(%attempt, "Attempt was reset while fetching the script");
            return;
        }

        session.resolving = false;
        session.view.state = WorkflowState::Completed;

        match fetched {
            Ok(artifact) => session.view.artifact = Some(artifact),
            Err(err) => {
                let err = GenerationError::Fetch(err.to_string());
                tracing::warn!(%script_id, "{}; showing placeholder", err);
                session.view.artifact = Some(Artifact::placeholder(&script_id, video_url));
                session.view.fetch_error = Some(err);
                self.notify(Notice::error("Failed to fetch script"));
            }
        }

        self.publish(&session);
        self.notify(Notice::success("Script generated successfully!"));
    }
}
