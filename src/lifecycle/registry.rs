//! # Registry of managed components.
//!
//! Owns one [`ComponentInstance`] per registered id: the live component, the
//! supervisor-side status and restart bookkeeping, and the handles that tie
//! the component to the outside world (its bus subscription and the task
//! listening to its notifications).
//!
//! ## Rules
//! - Ids are unique; inserting a duplicate fails.
//! - Only the supervisor mutates instances.
//! - Readers get [`ComponentInfo`] copies, never the instances themselves.
//! - Removing an instance detaches it: listener aborted, subscription dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::{MessageBus, SubscriptionId};
use crate::component::{ComponentConfig, ComponentRef, ComponentStatus};
use crate::error::LifecycleError;

/// Supervisor-side record of one component.
pub(crate) struct ComponentInstance {
    pub(crate) config: ComponentConfig,
    pub(crate) component: ComponentRef,
    /// Registration order; breaks priority ties.
    pub(crate) seq: u64,
    pub(crate) status: ComponentStatus,
    pub(crate) started_at: Option<Instant>,
    pub(crate) restart_count: u32,
    pub(crate) last_checked: Option<Instant>,
    pub(crate) last_health_check: Option<SystemTime>,
    /// Set once the restart budget is exhausted.
    pub(crate) failed: bool,
    pub(crate) subscription: SubscriptionId,
    pub(crate) listener: JoinHandle<()>,
}

impl ComponentInstance {
    pub(crate) fn info(&self) -> ComponentInfo {
        ComponentInfo {
            config: self.config.clone(),
            status: self.status,
            restart_count: self.restart_count,
            uptime: self.started_at.map(|t| t.elapsed()),
            last_health_check: self.last_health_check,
            failed: self.failed,
        }
    }

    pub(crate) fn detach(self, bus: &MessageBus) {
        self.listener.abort();
        bus.unsubscribe(self.subscription);
    }
}

/// Snapshot of a registered component, as returned by
/// [`LifecycleManager::agent_registry`](crate::LifecycleManager::agent_registry).
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    pub config: ComponentConfig,
    pub status: ComponentStatus,
    pub restart_count: u32,
    /// Time since the last successful start, while running.
    pub uptime: Option<Duration>,
    pub last_health_check: Option<SystemTime>,
    /// True once the component exhausted its restart budget.
    pub failed: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    instances: HashMap<String, ComponentInstance>,
    next_seq: u64,
}

impl Registry {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Inserts, or hands the instance back if the id is taken.
    pub(crate) fn insert(
        &mut self,
        instance: ComponentInstance,
    ) -> Result<(), (ComponentInstance, LifecycleError)> {
        let id = instance.config.id.clone();
        if self.instances.contains_key(&id) {
            return Err((instance, LifecycleError::AlreadyRegistered { id }));
        }
        self.instances.insert(id, instance);
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Option<&ComponentInstance> {
        self.instances.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ComponentInstance> {
        self.instances.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<ComponentInstance> {
        self.instances.remove(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.instances.values()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut ComponentInstance> {
        self.instances.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    /// Ids with priorities; startup order (descending) or shutdown order
    /// (ascending). Equal priorities keep registration order.
    pub(crate) fn ordered(&self, descending: bool) -> Vec<(String, i32)> {
        let mut ids: Vec<(i32, u64, String)> = self
            .instances
            .values()
            .map(|i| (i.config.priority, i.seq, i.config.id.clone()))
            .collect();
        if descending {
            ids.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        } else {
            ids.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        }
        ids.into_iter().map(|(p, _, id)| (id, p)).collect()
    }

    /// Status, restart count and handle of every component, in startup order.
    pub(crate) fn snapshot_refs(&self) -> Vec<(ComponentStatus, u32, ComponentRef)> {
        self.ordered(true)
            .iter()
            .filter_map(|(id, _)| self.instances.get(id))
            .map(|i| (i.status, i.restart_count, Arc::clone(&i.component)))
            .collect()
    }

    /// Snapshots in startup order.
    pub(crate) fn snapshot(&self) -> Vec<ComponentInfo> {
        self.ordered(true)
            .iter()
            .filter_map(|(id, _)| self.instances.get(id))
            .map(ComponentInstance::info)
            .collect()
    }
}
