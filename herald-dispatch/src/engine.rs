//! The engine facade
//!
//! One composed object owning the roster, pool, quota tracker, event log,
//! and run controller. Front-end collaborators (HTTP layer, CSV importer,
//! CLI) talk only to this surface; all shared state stays behind it.

use std::{sync::Arc, time::Duration};

use herald_common::{JobId, ProgressEvent, Recipient, RunState, SendJob, SenderIdentity};
use herald_events::{EventLog, EventStream};
use herald_store::StateStore;
use serde::Deserialize;

use crate::{
    clock::{Clock, SystemClock},
    controller::RunController,
    error::SubmitError,
    identity::IdentityPool,
    quota::QuotaTracker,
    roster::RecipientRoster,
    transport::MessageTransport,
    worker::{self, WorkerContext, WorkerState},
};

const fn default_daily_limit() -> usize {
    450
}

const fn default_identity_backoff_secs() -> u64 {
    60
}

const fn default_pause_poll_millis() -> u64 {
    1000
}

const fn default_event_log_capacity() -> usize {
    1000
}

const fn default_event_channel_capacity() -> usize {
    64
}

/// Tunable engine parameters, all with serviceable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Maximum sends per identity in the trailing 24-hour window.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: usize,

    /// How long to back off when every identity is at its limit.
    #[serde(default = "default_identity_backoff_secs")]
    pub identity_backoff_secs: u64,

    /// How often a paused worker re-checks the run state.
    #[serde(default = "default_pause_poll_millis")]
    pub pause_poll_millis: u64,

    /// Maximum events retained in the progress log.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    /// Per-subscriber event buffer size.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            identity_backoff_secs: default_identity_backoff_secs(),
            pause_poll_millis: default_pause_poll_millis(),
            event_log_capacity: default_event_log_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// The dispatch engine.
///
/// Constructed over a state store and a transport; restores all persisted
/// state before serving, so a restarted process picks up where the
/// previous one left off without re-sending completed work.
#[derive(Debug)]
pub struct Engine {
    roster: Arc<RecipientRoster>,
    pool: Arc<IdentityPool>,
    quota: Arc<QuotaTracker>,
    events: Arc<EventLog>,
    controller: Arc<RunController>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl Engine {
    /// Restore the engine from persisted state using the wall clock.
    ///
    /// # Errors
    /// Returns an error if any persisted concern cannot be loaded.
    pub async fn restore(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn MessageTransport>,
        settings: EngineSettings,
    ) -> herald_store::Result<Self> {
        Self::restore_with_clock(store, transport, settings, Arc::new(SystemClock)).await
    }

    /// Restore the engine with an explicit time source.
    ///
    /// # Errors
    /// Returns an error if any persisted concern cannot be loaded.
    pub async fn restore_with_clock(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn MessageTransport>,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> herald_store::Result<Self> {
        let quota =
            Arc::new(QuotaTracker::restore(Arc::clone(&store), settings.daily_limit).await?);
        let pool =
            Arc::new(IdentityPool::restore(Arc::clone(&store), Arc::clone(&quota)).await?);
        let roster = Arc::new(RecipientRoster::restore(Arc::clone(&store)).await?);
        let events = Arc::new(
            EventLog::restore(
                store,
                settings.event_log_capacity,
                settings.event_channel_capacity,
            )
            .await?,
        );

        Ok(Self {
            roster,
            pool,
            quota,
            events,
            controller: Arc::new(RunController::new()),
            transport,
            clock,
            settings,
        })
    }

    /// Append uploaded recipients to the pending queue. Records without an
    /// email are skipped; duplicates are kept. Returns the count imported.
    pub async fn import_recipients<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = Recipient>,
    {
        self.roster.import(records).await
    }

    /// Submit a send job.
    ///
    /// Validation is synchronous: empty templates, a pool with no enabled
    /// identity, and an empty pending queue are rejected here and never
    /// reach the worker. Placeholder validity is deliberately *not*
    /// checked, a bad placeholder surfaces per recipient as error events.
    ///
    /// # Errors
    /// Returns a [`SubmitError`] describing the rejection.
    pub async fn submit_job(&self, job: SendJob) -> Result<JobId, SubmitError> {
        if job.subject_template.trim().is_empty() {
            return Err(SubmitError::EmptySubject);
        }
        if job.body_template.trim().is_empty() {
            return Err(SubmitError::EmptyBody);
        }
        if !self.pool.has_enabled().await {
            return Err(SubmitError::NoEnabledIdentities);
        }
        let pending = self.roster.pending_len().await;
        if pending == 0 {
            return Err(SubmitError::NoPendingRecipients);
        }

        let id = job.id;
        self.events
            .append(ProgressEvent::info(format!(
                "Job {id} accepted; {pending} recipients pending"
            )))
            .await;

        if self.controller.enqueue(job) {
            self.spawn_worker();
        }

        Ok(id)
    }

    fn spawn_worker(&self) {
        let ctx = WorkerContext {
            roster: Arc::clone(&self.roster),
            pool: Arc::clone(&self.pool),
            quota: Arc::clone(&self.quota),
            events: Arc::clone(&self.events),
            transport: Arc::clone(&self.transport),
            controller: Arc::clone(&self.controller),
            clock: Arc::clone(&self.clock),
            identity_backoff: Duration::from_secs(self.settings.identity_backoff_secs),
            pause_poll: Duration::from_millis(self.settings.pause_poll_millis),
        };

        // Subscribe before spawning so a shutdown issued immediately after
        // submission cannot be missed.
        let shutdown = self.controller.subscribe_shutdown();
        drop(tokio::spawn(worker::run(ctx, shutdown)));
    }

    /// Request a pause; takes effect at the worker's next polling check.
    pub async fn pause(&self) {
        self.controller.pause();
        self.events
            .append(ProgressEvent::info("Dispatch paused"))
            .await;
    }

    /// Resume a paused run.
    pub async fn resume(&self) {
        self.controller.resume();
        self.events
            .append(ProgressEvent::info("Dispatch resumed"))
            .await;
    }

    /// Request a graceful stop of the running worker; an in-flight send
    /// completes first.
    pub fn shutdown(&self) {
        self.controller.shutdown();
    }

    /// The process-wide run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.controller.run_state()
    }

    /// The worker's last observed state, for diagnostics.
    #[must_use]
    pub fn worker_state(&self) -> WorkerState {
        self.controller.worker_state()
    }

    /// Jobs waiting, including the active one.
    #[must_use]
    pub fn queued_jobs(&self) -> usize {
        self.controller.queued_jobs()
    }

    pub async fn pending_count(&self) -> usize {
        self.roster.pending_len().await
    }

    pub async fn completed_count(&self) -> usize {
        self.roster.completed_len().await
    }

    /// One page of the pending queue, in queue order.
    pub async fn list_pending(&self, offset: usize, limit: usize) -> Vec<Recipient> {
        self.roster.pending_page(offset, limit).await
    }

    /// One page of the completed list, in completion order.
    pub async fn list_completed(&self, offset: usize, limit: usize) -> Vec<Recipient> {
        self.roster.completed_page(offset, limit).await
    }

    /// Remove every pending recipient with the given address.
    pub async fn remove_pending(&self, email: &str) -> usize {
        self.roster.remove_pending(email).await
    }

    /// Drop the entire pending queue.
    pub async fn clear_pending(&self) -> usize {
        self.roster.clear_pending().await
    }

    /// The identity registry in rotation order.
    pub async fn identities(&self) -> Vec<SenderIdentity> {
        self.pool.list().await
    }

    /// Add or replace a sender identity.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be persisted.
    pub async fn upsert_identity(&self, identity: SenderIdentity) -> herald_store::Result<()> {
        self.pool.upsert(identity).await
    }

    /// Enable or disable a sender identity.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be persisted.
    pub async fn set_identity_enabled(
        &self,
        address: &str,
        enabled: bool,
    ) -> herald_store::Result<bool> {
        self.pool.set_enabled(address, enabled).await
    }

    /// Remove a sender identity from future rotation.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be persisted.
    pub async fn remove_identity(&self, address: &str) -> herald_store::Result<bool> {
        self.pool.remove(address).await
    }

    /// Per-identity sends within the current window.
    pub async fn usage_summary(&self) -> Vec<(String, usize)> {
        self.quota.usage_summary(self.clock.now()).await
    }

    /// Register a live progress subscriber.
    #[must_use]
    pub fn subscribe_events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// The most recent `limit` events, oldest first.
    pub async fn replay_events(&self, limit: usize) -> Vec<ProgressEvent> {
        self.events.replay(limit).await
    }
}
