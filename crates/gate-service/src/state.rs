use crate::engine::GateEngine;
use crate::sink::AccessLog;
use crate::verify::{IdentityDirectory, VehicleRegistry};
use std::sync::Arc;

/// Shared state handed to the HTTP router.
#[derive(Clone)]
pub struct GateServiceState {
    inner: Arc<GateServiceStateInner>,
}

struct GateServiceStateInner {
    node_id: String,
    engine: Arc<GateEngine>,
    directory: Arc<dyn IdentityDirectory>,
    registry: Arc<dyn VehicleRegistry>,
    log: Arc<dyn AccessLog>,
}

impl GateServiceState {
    pub fn new(
        node_id: String,
        engine: Arc<GateEngine>,
        directory: Arc<dyn IdentityDirectory>,
        registry: Arc<dyn VehicleRegistry>,
        log: Arc<dyn AccessLog>,
    ) -> Self {
        Self {
            inner: Arc::new(GateServiceStateInner {
                node_id,
                engine,
                directory,
                registry,
                log,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn engine(&self) -> &Arc<GateEngine> {
        &self.inner.engine
    }

    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.inner.directory
    }

    pub fn registry(&self) -> &Arc<dyn VehicleRegistry> {
        &self.inner.registry
    }

    pub fn log(&self) -> &Arc<dyn AccessLog> {
        &self.inner.log
    }
}
