//! Group configuration and the registry of live running counts.
//!
//! The running count of each group is the only piece of shared mutable state
//! that admission contends on. It is tracked with a lock-free CAS loop so that
//! two admissions racing for the last slot cannot both succeed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Maximum length of a group name.
pub const MAX_GROUP_NAME_LEN: usize = 255;

/// Per-group defaults applied to every task in the group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Image used by tasks that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Environment injected into every task of the group.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// Upper bound on simultaneously running tasks; unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
}

impl GroupConfig {
    /// Reject configurations that could never admit a task.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.image.as_deref().is_some_and(str::is_empty) {
            return Err("image must not be empty".into());
        }
        Ok(())
    }
}

/// A named scheduling domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group name.
    pub name: String,
    /// Group defaults and limits.
    #[serde(flatten)]
    pub config: GroupConfig,
}

/// Check that a group name is usable as a key and as a path component.
pub fn validate_group_name(name: &str) -> Result<(), SchedulerError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if name.is_empty() || name.len() > MAX_GROUP_NAME_LEN || !valid_chars || name == "." || name == ".."
    {
        return Err(SchedulerError::InvalidArgument(format!(
            "invalid group name `{name}`"
        )));
    }
    Ok(())
}

struct GroupSlot {
    config: RwLock<GroupConfig>,
    running: AtomicU32,
}

impl GroupSlot {
    fn new(config: GroupConfig) -> Self {
        Self {
            config: RwLock::new(config),
            running: AtomicU32::new(0),
        }
    }
}

/// Registry of group configuration and running counts.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<GroupSlot>>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Option<Arc<GroupSlot>> {
        self.groups.read().get(name).cloned()
    }

    /// Create or replace a group's configuration. Running counts survive.
    pub fn upsert(&self, name: &str, config: GroupConfig) -> Group {
        if let Some(slot) = self.slot(name) {
            *slot.config.write() = config.clone();
        } else {
            self.groups
                .write()
                .entry(name.to_owned())
                .and_modify(|slot| *slot.config.write() = config.clone())
                .or_insert_with(|| Arc::new(GroupSlot::new(config.clone())));
        }
        Group {
            name: name.to_owned(),
            config,
        }
    }

    /// Return the group, creating it with default configuration if absent.
    /// The flag reports whether it was created by this call.
    pub fn ensure(&self, name: &str) -> (Group, bool) {
        if let Some(slot) = self.slot(name) {
            let config = slot.config.read().clone();
            return (
                Group {
                    name: name.to_owned(),
                    config,
                },
                false,
            );
        }
        let mut groups = self.groups.write();
        let mut created = false;
        let slot = groups.entry(name.to_owned()).or_insert_with(|| {
            created = true;
            Arc::new(GroupSlot::new(GroupConfig::default()))
        });
        let config = slot.config.read().clone();
        drop(groups);
        (
            Group {
                name: name.to_owned(),
                config,
            },
            created,
        )
    }

    /// Look up a group.
    pub fn get(&self, name: &str) -> Result<Group, SchedulerError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| SchedulerError::NotFound(format!("group {name}")))?;
        let config = slot.config.read().clone();
        Ok(Group {
            name: name.to_owned(),
            config,
        })
    }

    /// Try to take a concurrency slot. Fails closed when the group is at its
    /// ceiling or unknown.
    pub fn increment_running(&self, name: &str) -> bool {
        let Some(slot) = self.slot(name) else {
            return false;
        };
        let limit = slot.config.read().max_concurrency.unwrap_or(u32::MAX);
        let mut current = slot.running.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match slot.running.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release a concurrency slot.
    pub fn decrement_running(&self, name: &str) {
        let Some(slot) = self.slot(name) else {
            return;
        };
        let released = slot
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_err() {
            tracing::warn!("group {} released a slot it did not hold", name);
        }
    }

    /// Current number of running tasks in the group.
    pub fn running(&self, name: &str) -> u32 {
        self.slot(name)
            .map_or(0, |slot| slot.running.load(Ordering::Acquire))
    }
}
