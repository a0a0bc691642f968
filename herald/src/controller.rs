use std::sync::{Arc, LazyLock};

use herald_common::{SenderIdentity, Signal, internal, logging, tracing};
use herald_dispatch::{DevNullTransport, Engine, EngineSettings};
use herald_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration and composition root.
///
/// Deserializes directly from the RON configuration file and owns the
/// wiring: store, engine, and the seed identity registry.
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    engine: EngineSettings,

    /// Identities applied to the registry at boot. Already-registered
    /// addresses are left untouched, so runtime changes (disabled flags,
    /// rotated credentials) survive restarts.
    #[serde(alias = "identity", default)]
    identities: Vec<SenderIdentity>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

/// Apply the configured seed identities, skipping addresses the registry
/// already knows.
async fn seed_identities(engine: &Engine, seeds: Vec<SenderIdentity>) -> anyhow::Result<()> {
    let known: Vec<String> = engine
        .identities()
        .await
        .into_iter()
        .map(|identity| identity.address)
        .collect();

    for identity in seeds {
        if known.contains(&identity.address) {
            continue;
        }
        engine.upsert_identity(identity).await?;
    }

    Ok(())
}

impl Herald {
    /// Run this controller until a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be restored or the seed
    /// identities cannot be written.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let Self {
            store,
            engine: settings,
            identities,
        } = self;

        let store = store.into_state_store();
        let engine =
            Arc::new(Engine::restore(store, Arc::new(DevNullTransport), settings).await?);

        seed_identities(&engine, identities).await?;

        internal!(
            level = INFO,
            "Engine restored: {} pending, {} completed, {} identities",
            engine.pending_count().await,
            engine.completed_count().await,
            engine.identities().await.len()
        );

        let mut signals = SHUTDOWN_BROADCAST.subscribe();

        tokio::select! {
            sig = signals.recv() => {
                tracing::debug!("Received {sig:?}");
            }
            r = shutdown() => {
                r?;
            }
        }

        internal!(level = INFO, "Shutting down...");
        engine.shutdown();

        Ok(())
    }

    /// Engine settings accessor for embedding callers.
    #[must_use]
    pub const fn engine_settings(&self) -> &EngineSettings {
        &self.engine
    }
}
