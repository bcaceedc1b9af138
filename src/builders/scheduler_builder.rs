//! Builder wiring configuration, backends and runtime into a [`Scheduler`].

use std::sync::Arc;

use crate::config::{LogBackendConfig, SchedulerConfig, StoreBackendConfig};
use crate::core::{
    AuditSink, LogStore, Scheduler, SchedulerError, SchedulerParts, Spawn, TaskExecutor, TaskStore,
};
use crate::infra::{FileLogStore, FileTaskStore, InMemoryLogStore, InMemoryTaskStore};
use crate::util::clock::{Clock, MonotonicClock};

/// Builder for a [`Scheduler`]. Backends named in the configuration are
/// constructed unless overridden explicitly.
pub struct SchedulerBuilder<E, S> {
    config: SchedulerConfig,
    executor: E,
    spawner: S,
    store: Option<Arc<dyn TaskStore>>,
    logs: Option<Arc<dyn LogStore>>,
    clock: Option<Arc<dyn Clock>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<E, S> SchedulerBuilder<E, S>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    /// Start a builder from configuration, an executor and a spawner.
    pub fn new(config: SchedulerConfig, executor: E, spawner: S) -> Self {
        Self {
            config,
            executor,
            spawner,
            store: None,
            logs: None,
            clock: None,
            audit: None,
        }
    }

    /// Configuration this builder was created with.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Use the given task store instead of the configured backend.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use the given log store instead of the configured backend.
    #[must_use]
    pub fn with_logs(mut self, logs: Arc<dyn LogStore>) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Override the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Record lifecycle events to an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate configuration, open backends, seed groups and recover tasks
    /// orphaned by a previous process. The returned scheduler is not started.
    pub fn build(self) -> Result<Scheduler<E, S>, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::InvalidArgument(format!("config invalid: {e}")))?;

        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config.store)?,
        };
        let logs = match self.logs {
            Some(logs) => logs,
            None => build_logs(&self.config.logs)?,
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let scheduler = Scheduler::from_parts(SchedulerParts {
            limits: self.config.limits(),
            store,
            logs,
            executor: self.executor,
            spawner: self.spawner,
            clock,
            audit: self.audit,
        })?;

        for (name, group) in &self.config.groups {
            scheduler.upsert_group(name, group.clone())?;
        }

        let recovered = scheduler.recover()?;
        if recovered > 0 {
            tracing::warn!("recovered {} task(s) left running by a previous process", recovered);
        }
        tracing::info!(
            "scheduler built with {} configured group(s)",
            self.config.groups.len()
        );
        Ok(scheduler)
    }
}

fn build_store(cfg: &StoreBackendConfig) -> Result<Arc<dyn TaskStore>, SchedulerError> {
    Ok(match cfg {
        StoreBackendConfig::InMemory => Arc::new(InMemoryTaskStore::new()),
        StoreBackendConfig::File { path } => Arc::new(FileTaskStore::open(path)?),
    })
}

fn build_logs(cfg: &LogBackendConfig) -> Result<Arc<dyn LogStore>, SchedulerError> {
    Ok(match cfg {
        LogBackendConfig::InMemory => Arc::new(InMemoryLogStore::new()),
        LogBackendConfig::File { path } => Arc::new(FileLogStore::new(path)?),
    })
}
