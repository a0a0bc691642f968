//! The dispatch worker loop
//!
//! One background task drains the pending queue: pop a recipient, obtain
//! an identity, render, hand to the transport, route the outcome, pace,
//! repeat. Every per-recipient error is absorbed here, only running out
//! of identities (backoff) or out of recipients (job retirement) changes
//! the run itself.

use std::{sync::Arc, time::Duration};

use herald_common::{ProgressEvent, RunState, Signal, internal};
use herald_events::EventLog;
use tokio::{sync::broadcast, time::sleep};
use tracing::warn;

use crate::{
    clock::Clock, controller::RunController, identity::IdentityPool, quota::QuotaTracker,
    roster::RecipientRoster, template, transport::MessageTransport,
};

/// Observable state of the dispatch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Actively processing recipients.
    Draining,
    /// Every identity is at its quota; backing off.
    WaitingForIdentity,
    /// No job and nothing pending.
    Idle,
    /// Controller-requested stop.
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draining => f.write_str("draining"),
            Self::WaitingForIdentity => f.write_str("waiting-for-identity"),
            Self::Idle => f.write_str("idle"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Everything the worker loop needs, cloned out of the engine at spawn
/// time.
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub(crate) roster: Arc<RecipientRoster>,
    pub(crate) pool: Arc<IdentityPool>,
    pub(crate) quota: Arc<QuotaTracker>,
    pub(crate) events: Arc<EventLog>,
    pub(crate) transport: Arc<dyn MessageTransport>,
    pub(crate) controller: Arc<RunController>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) identity_backoff: Duration,
    pub(crate) pause_poll: Duration,
}

/// Whether a controller-requested stop has been broadcast.
///
/// A lagged receiver can only have missed shutdown signals, so lag counts
/// as a stop; so does a closed channel (the controller is gone).
fn stop_requested(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    match shutdown.try_recv() {
        Ok(Signal::Shutdown | Signal::Finalised) => true,
        Err(broadcast::error::TryRecvError::Closed | broadcast::error::TryRecvError::Lagged(_)) => {
            true
        }
        Err(broadcast::error::TryRecvError::Empty) => false,
    }
}

/// Run the dispatch loop until the job queue drains or a stop is
/// requested.
///
/// Exactly one instance runs process-wide; the controller's enqueue/exit
/// handshake enforces that.
#[allow(clippy::too_many_lines, reason = "The loop states are clearest in one place")]
pub(crate) async fn run(ctx: WorkerContext, mut shutdown: broadcast::Receiver<Signal>) {
    internal!(level = DEBUG, "Dispatch worker started");
    ctx.controller.set_worker_state(WorkerState::Draining);

    loop {
        if stop_requested(&mut shutdown) {
            ctx.controller.force_exit();
            ctx.events.append(ProgressEvent::info("Dispatch stopped")).await;
            internal!(level = DEBUG, "Dispatch worker stopped on request");
            break;
        }

        // Pause is polled cooperatively; a send already past this check
        // completes and is recorded before the pause bites.
        if ctx.controller.run_state() == RunState::Paused {
            sleep(ctx.pause_poll).await;
            continue;
        }

        let Some(job) = ctx.controller.current_job() else {
            if ctx.controller.try_exit() {
                internal!(level = DEBUG, "Dispatch worker idle; exiting");
                break;
            }
            // A job landed between the check and the exit handshake.
            continue;
        };

        let Some(recipient) = ctx.roster.pop_pending().await else {
            // Current job exhausted the queue; retire it and move on.
            ctx.controller.retire_job(job.id);
            let completed = ctx.roster.completed_len().await;
            ctx.events
                .append(ProgressEvent::info(format!(
                    "Job {} finished; {completed} recipients completed",
                    job.id
                )))
                .await;
            continue;
        };

        let now = ctx.clock.now();
        let Some(identity) = ctx.pool.next_available(now).await else {
            // The system is out of capacity, not this recipient: it keeps
            // its place at the head of the queue.
            ctx.controller.set_worker_state(WorkerState::WaitingForIdentity);
            ctx.roster.push_pending_front(recipient).await;
            ctx.events
                .append(ProgressEvent::info(format!(
                    "All sender identities are at their daily limit; backing off for {}s",
                    ctx.identity_backoff.as_secs()
                )))
                .await;
            sleep(ctx.identity_backoff).await;
            continue;
        };

        ctx.controller.set_worker_state(WorkerState::Draining);

        let rendered = template::render(&job.subject_template, &recipient).and_then(|subject| {
            template::render(&job.body_template, &recipient).map(|body| (subject, body))
        });
        let (subject, body) = match rendered {
            Ok(parts) => parts,
            Err(e) => {
                // The same template error will recur for this recipient,
                // but it must not stall the rest of the queue, and waiting
                // would not help, demote and continue immediately.
                ctx.roster.push_pending_back(recipient.clone()).await;
                ctx.events
                    .append(
                        ProgressEvent::error(format!(
                            "Template error for {}: {e}",
                            recipient.email
                        ))
                        .with_recipient(recipient.email.clone()),
                    )
                    .await;
                continue;
            }
        };

        match ctx
            .transport
            .send(&identity, &recipient.email, &subject, &body)
            .await
        {
            Ok(()) => {
                let recorded_at = ctx.clock.now();
                if let Err(e) = ctx.quota.record_use(&identity.address, recorded_at).await {
                    warn!(
                        identity = %identity.address,
                        error = %e,
                        "Failed to persist usage record; in-memory enforcement still holds"
                    );
                }
                ctx.roster.mark_completed(recipient.clone()).await;

                let used = ctx.quota.usage_count(&identity.address, recorded_at).await;
                ctx.events
                    .append(
                        ProgressEvent::success(format!(
                            "Sent to {} via {} ({used}/{} in the last 24h)",
                            recipient.email,
                            identity.address,
                            ctx.quota.daily_limit()
                        ))
                        .with_recipient(recipient.email.clone())
                        .with_identity(identity.address.clone()),
                    )
                    .await;
            }
            Err(e) => {
                ctx.roster.push_pending_back(recipient.clone()).await;
                ctx.events
                    .append(
                        ProgressEvent::error(format!(
                            "Failed to send to {}: {e}",
                            recipient.email
                        ))
                        .with_recipient(recipient.email.clone())
                        .with_identity(identity.address.clone()),
                    )
                    .await;
            }
        }

        // Deliberate pacing: spreads quota consumption across the day and
        // keeps remote servers friendly.
        if job.interval_secs > 0 {
            sleep(Duration::from_secs(job.interval_secs)).await;
        }
    }
}
