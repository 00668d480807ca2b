use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use crate::config::ProbeKind;
use crate::context::PluginContext;

/// Message reported on a passing check
pub const HEALTHY_MESSAGE: &str = "Data source is working";

/// Trait for health probe functionality
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Perform a check; any error marks the datasource unhealthy
    async fn check(&self) -> Result<()>;

    /// Get the name of this probe
    fn name(&self) -> &str;
}

/// Fails half of the time, to show both outcomes in the UI
pub struct RandomProbe;

#[async_trait]
impl HealthProbe for RandomProbe {
    async fn check(&self) -> Result<()> {
        if rand::random::<bool>() {
            Ok(())
        } else {
            Err(anyhow!("randomized error"))
        }
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Always passes
pub struct AlwaysOkProbe;

#[async_trait]
impl HealthProbe for AlwaysOkProbe {
    async fn check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "always_ok"
    }
}

/// Probe backed by a closure
pub struct FnProbe<F> {
    check_fn: F,
    name: String,
}

impl<F> FnProbe<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, check_fn: F) -> Self {
        Self {
            check_fn,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<F> HealthProbe for FnProbe<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    async fn check(&self) -> Result<()> {
        (self.check_fn)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build one of the built-in probes
pub fn probe_for(kind: ProbeKind) -> Arc<dyn HealthProbe> {
    match kind {
        ProbeKind::Random => Arc::new(RandomProbe),
        ProbeKind::AlwaysOk => Arc::new(AlwaysOkProbe),
    }
}

/// Health status reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct CheckHealthRequest {
    pub plugin_context: PluginContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
}

/// Handler for the host's health check button
#[async_trait]
pub trait CheckHealthHandler: Send + Sync {
    async fn check_health(&self, req: CheckHealthRequest) -> crate::error::Result<CheckHealthResult>;
}

/// Turns a probe outcome into a health result
#[derive(Clone)]
pub struct HealthReporter {
    probe: Arc<dyn HealthProbe>,
}

impl HealthReporter {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    pub async fn report(&self) -> CheckHealthResult {
        match self.probe.check().await {
            Ok(()) => {
                debug!("Health probe {} passed", self.probe.name());
                CheckHealthResult {
                    status: HealthStatus::Ok,
                    message: HEALTHY_MESSAGE.to_string(),
                }
            }
            Err(e) => {
                warn!("Health probe {} failed: {}", self.probe.name(), e);
                let message = e.to_string();
                CheckHealthResult {
                    status: HealthStatus::Error,
                    message: if message.is_empty() {
                        "health check failed".to_string()
                    } else {
                        message
                    },
                }
            }
        }
    }
}
