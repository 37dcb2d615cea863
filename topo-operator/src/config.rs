//! Operator configuration.

use std::time::Duration;

use thiserror::Error;

use crate::controller::ControllerConfig;

/// Default finalizer token owned by this operator.
pub const DEFAULT_FINALIZER: &str = "topo";
/// Default name of the onos-topo service.
pub const DEFAULT_TOPO_SERVICE: &str = "onos-topo";
/// Default onos-topo gRPC port.
pub const DEFAULT_TOPO_PORT: u16 = 5150;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("finalizer token must not be empty")]
    EmptyFinalizer,

    #[error("topo service name must not be empty")]
    EmptyService,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("backoff base {base:?} exceeds max {max:?}")]
    InvalidBackoff { base: Duration, max: Duration },

    #[error("timeout must be non-zero: {0}")]
    ZeroTimeout(&'static str),
}

/// Where to find onos-topo for a given namespace.
#[derive(Debug, Clone)]
pub struct TopoEndpoint {
    pub service: String,
    pub port: u16,
    /// Fixed endpoint, bypassing per-namespace service resolution.
    pub address: Option<String>,
    pub connect_timeout: Duration,
}

impl TopoEndpoint {
    /// Endpoint URI for the topo service in `namespace`.
    pub fn resolve(&self, namespace: &str) -> String {
        match &self.address {
            Some(address) => address.clone(),
            None => format!("http://{}.{}:{}", self.service, namespace, self.port),
        }
    }
}

impl Default for TopoEndpoint {
    fn default() -> Self {
        Self {
            service: DEFAULT_TOPO_SERVICE.to_string(),
            port: DEFAULT_TOPO_PORT,
            address: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Full operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub finalizer: String,
    pub topo: TopoEndpoint,
    pub controller: ControllerConfig,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.finalizer.is_empty() {
            return Err(ConfigError::EmptyFinalizer);
        }
        if self.topo.address.is_none() && self.topo.service.is_empty() {
            return Err(ConfigError::EmptyService);
        }
        if self.topo.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("connect"));
        }
        if self.controller.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.controller.reconcile_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("reconcile"));
        }
        let backoff = &self.controller.backoff;
        if backoff.base > backoff.max {
            return Err(ConfigError::InvalidBackoff {
                base: backoff.base,
                max: backoff.max,
            });
        }
        Ok(())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
            topo: TopoEndpoint::default(),
            controller: ControllerConfig::default(),
        }
    }
}
