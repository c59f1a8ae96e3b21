//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Scripted stand-in for the device session, useful for tests and examples.
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use pacmon_msg::{Measurement, MeasurementSender};
use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::factory::SessionFactory;
use crate::session::DeviceSession;

/// What one scripted generation does: emit `measurements`, then die with `failure`.
#[derive(Debug)]
pub struct SessionScript {
    /// Measurements pushed before failing.
    pub measurements: Vec<Measurement>,
    /// Error reported to the source.
    pub failure: SessionError,
}

impl SessionScript {
    /// A generation that fails straight away.
    pub fn failing(failure: SessionError) -> Self {
        Self {
            measurements: Vec::new(),
            failure,
        }
    }
}

/// Factory replaying [`SessionScript`]s in order.
///
/// Once the scripts run out, new sessions never finish, which parks the source on its
/// current generation.
#[derive(Clone, Default)]
pub struct ScriptedSessionFactory {
    scripts: Arc<Mutex<VecDeque<SessionScript>>>,
    generations: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedSessionFactory {
    /// Factory replaying `scripts`.
    #[must_use]
    pub fn new(scripts: impl IntoIterator<Item = SessionScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            generations: Arc::default(),
        }
    }

    /// Number of sessions created so far.
    pub fn created(&self) -> usize {
        self.generations.lock().len()
    }

    /// Generation numbers passed to [`SessionFactory::create`], in call order.
    pub fn generations(&self) -> Vec<u64> {
        self.generations.lock().clone()
    }

    /// Scripts not yet handed out.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().len()
    }
}

impl SessionFactory for ScriptedSessionFactory {
    fn create(
        &self,
        _config: Arc<SessionConfig>,
        generation: u64,
        measurements: MeasurementSender,
    ) -> Box<dyn DeviceSession> {
        self.generations.lock().push(generation);
        Box::new(ScriptedSession {
            script: self.scripts.lock().pop_front(),
            measurements,
        })
    }
}

struct ScriptedSession {
    script: Option<SessionScript>,
    measurements: MeasurementSender,
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn start_and_emit(self: Box<Self>) -> SessionError {
        let ScriptedSession {
            script,
            measurements,
        } = *self;
        let Some(script) = script else {
            return std::future::pending().await;
        };
        for measurement in script.measurements {
            if measurements.send(measurement).await.is_err() {
                return SessionError::StreamClosed;
            }
        }
        script.failure
    }
}
