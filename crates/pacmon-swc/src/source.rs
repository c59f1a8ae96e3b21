//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Restart loop keeping one device session alive at a time.
//!
//! Every fatal session error is logged and followed immediately by a new generation. There
//! is no backoff and no attempt limit: the control unit is a local appliance and the only
//! useful reaction to a broken link is to dial it again. Measurements from all generations
//! share one [`MeasurementStream`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pacmon_common::config::SourceSettings;
use pacmon_msg::{measurement_channel, MeasurementSender, MeasurementStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::ConfigError;
use crate::factory::{SessionFactory, SwcSessionFactory};
use crate::metrics::SourceMetrics;
use crate::task::TaskGuard;

const LOG_TARGET: &str = "pacmon::swc::source";

/// Supervising source producing an endless measurement stream from a control unit.
pub struct SupervisedSource<F = SwcSessionFactory> {
    config: Arc<SessionConfig>,
    factory: Arc<F>,
    sender: MeasurementSender,
    stream: MeasurementStream,
    metrics: Option<SourceMetrics>,
    generations: Arc<AtomicU64>,
}

impl SupervisedSource<SwcSessionFactory> {
    /// Validate `settings` and prepare a source talking to a real control unit.
    pub fn new(settings: &SourceSettings) -> Result<Self, ConfigError> {
        Self::with_factory(settings, SwcSessionFactory::default())
    }

    /// Same as [`SupervisedSource::new`], recording session and source counters on
    /// `metrics`.
    pub fn with_metrics(
        settings: &SourceSettings,
        metrics: SourceMetrics,
    ) -> Result<Self, ConfigError> {
        let source = Self::with_factory(settings, SwcSessionFactory::with_metrics(metrics.clone()))?;
        Ok(source.metrics(metrics))
    }
}

impl<F: SessionFactory> SupervisedSource<F> {
    /// Validate `settings` and prepare a source whose sessions come from `factory`.
    ///
    /// Configuration problems are reported here, before anything is spawned.
    pub fn with_factory(settings: &SourceSettings, factory: F) -> Result<Self, ConfigError> {
        let config = SessionConfig::try_from(settings)?;
        let (sender, stream) = measurement_channel(config.channel_capacity());
        Ok(Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            sender,
            stream,
            metrics: None,
            generations: Arc::default(),
        })
    }

    /// Attach counters for generations and failures.
    pub fn metrics(mut self, metrics: SourceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validated configuration shared by every generation.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle on the output stream.
    pub fn stream(&self) -> MeasurementStream {
        self.stream.clone()
    }

    /// Spawn the restart loop. Must be called within a Tokio runtime.
    ///
    /// Calling it again starts another loop feeding the same stream; generation numbers
    /// stay unique across loops.
    pub fn start(&self) -> SourceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            config: self.config.clone(),
            factory: self.factory.clone(),
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
            generations: self.generations.clone(),
        };
        let task = tokio::spawn(supervisor.run(shutdown_rx));
        SourceHandle {
            stream: self.stream.clone(),
            generations: self.generations.clone(),
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Running restart loop.
///
/// Dropping the handle leaves the loop running; use [`SourceHandle::shutdown`] to stop it.
#[derive(Debug)]
pub struct SourceHandle {
    stream: MeasurementStream,
    generations: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SourceHandle {
    /// Output stream shared by every generation.
    pub fn stream(&self) -> MeasurementStream {
        self.stream.clone()
    }

    /// Sessions started so far by the owning source.
    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    /// Stop restarting and abort the active session.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(target: LOG_TARGET, error = %err, "source supervisor task ended abnormally");
        }
    }
}

struct Supervisor<F> {
    config: Arc<SessionConfig>,
    factory: Arc<F>,
    sender: MeasurementSender,
    metrics: Option<SourceMetrics>,
    generations: Arc<AtomicU64>,
}

impl<F: SessionFactory> Supervisor<F> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if self.sender.is_closed() {
                info!(target: LOG_TARGET, "measurement stream has no consumers; stopping source");
                break;
            }

            let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(metrics) = &self.metrics {
                metrics.inc_generation();
            }
            info!(
                target: LOG_TARGET,
                generation,
                endpoint = self.config.endpoint(),
                "starting device session",
            );

            let session = self
                .factory
                .create(self.config.clone(), generation, self.sender.clone());
            let (failure_tx, failure_rx) = oneshot::channel();
            // Dropped at the end of the iteration, which aborts the session on shutdown.
            let _session = TaskGuard::spawn(async move {
                let err = session.start_and_emit().await;
                let _ = failure_tx.send(err);
            });

            tokio::select! {
                failure = failure_rx => {
                    let kind = match failure {
                        Ok(err) => {
                            warn!(
                                target: LOG_TARGET,
                                generation,
                                kind = err.kind(),
                                error = %err,
                                "device session failed",
                            );
                            err.kind()
                        }
                        Err(_) => {
                            warn!(
                                target: LOG_TARGET,
                                generation,
                                "device session ended without reporting an error",
                            );
                            "aborted"
                        }
                    };
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_failure(kind);
                    }
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!(target: LOG_TARGET, generation, "source shutdown requested");
                    break;
                }
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Handle dropped without asking for shutdown: keep running.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::{SessionError, TransportError};
    use crate::mock::{ScriptedSessionFactory, SessionScript};
    use prometheus::Registry;
    use tokio::time::{sleep, timeout};

    fn settings() -> SourceSettings {
        SourceSettings::for_endpoint("ws://127.0.0.1:8214/")
    }

    async fn wait_for(factory: &ScriptedSessionFactory, created: usize) {
        timeout(Duration::from_secs(2), async {
            while factory.created() < created {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sessions were not restarted in time");
    }

    #[test]
    fn invalid_endpoint_fails_before_start() {
        let err = SupervisedSource::new(&SourceSettings::for_endpoint("tcp://127.0.0.1:8214"))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
    }

    #[tokio::test]
    async fn one_new_generation_per_failure() {
        let scripts =
            (0..3).map(|_| SessionScript::failing(SessionError::from(TransportError::Closed)));
        let factory = ScriptedSessionFactory::new(scripts);
        let registry = Registry::new();
        let metrics = SourceMetrics::new(&registry).unwrap();
        let source = SupervisedSource::with_factory(&settings(), factory.clone())
            .unwrap()
            .metrics(metrics.clone());

        let handle = source.start();
        wait_for(&factory, 4).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(factory.created(), 4);
        assert_eq!(factory.generations(), vec![1, 2, 3, 4]);
        assert_eq!(metrics.failures("closed"), 3);
        assert_eq!(metrics.generations(), metrics.failures("closed") + 1);
        assert_eq!(handle.generations(), 4);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_restarting() {
        let factory = ScriptedSessionFactory::new([]);
        let source = SupervisedSource::with_factory(&settings(), factory.clone()).unwrap();
        let handle = source.start();
        wait_for(&factory, 1).await;
        timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown completes");
        assert_eq!(factory.created(), 1);
    }
}
