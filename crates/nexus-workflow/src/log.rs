//! Workflow log store: bounded, newest-first audit log with subscribers.
//!
//! One [`AutomationLog`] per processed event that matched at least one rule.
//! Eviction is FIFO: once the capacity is reached the oldest entry drops off.
//! Subscribers get a snapshot of the full list on subscribe and after every
//! change. Broadcasts are serialized, so every subscriber sees snapshots in
//! the order the changes were made. Callbacks run outside the state lock: a
//! callback may read the store or unsubscribe, but must not push or notify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub const DEFAULT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Completed,
    Failed,
}

/// Execution record for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    pub status: ActionStatus,
    pub timestamp: DateTime<Utc>,
    /// Action-specific result payload (a drafted email, an escalation level, ...).
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Completed,
    /// Some actions failed, some completed.
    Partial,
    Failed,
}

impl LogStatus {
    /// Roll up the status of a batch of actions.
    pub fn from_actions(actions: &[WorkflowAction]) -> Self {
        let failed = actions
            .iter()
            .filter(|a| a.status == ActionStatus::Failed)
            .count();
        match failed {
            0 => LogStatus::Completed,
            n if n == actions.len() => LogStatus::Failed,
            _ => LogStatus::Partial,
        }
    }
}

/// Audit record of everything executed for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLog {
    pub id: String,
    #[serde(rename = "triggerType")]
    pub trigger_type: String,
    #[serde(rename = "entityName")]
    pub entity_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: LogStatus,
    pub actions: Vec<WorkflowAction>,
}

type Callback = Arc<dyn Fn(&[AutomationLog]) + Send + Sync>;

struct LogState {
    logs: VecDeque<AutomationLog>,
    capacity: usize,
    subscribers: Vec<(u64, Callback)>,
    next_id: u64,
}

/// Cheap to clone; clones share the same log.
#[derive(Clone)]
pub struct AutomationLogStore {
    state: Arc<Mutex<LogState>>,
    /// Held from snapshot to the end of a broadcast. Taken before `state`.
    delivery: Arc<Mutex<()>>,
}

impl Default for AutomationLogStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl AutomationLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                logs: VecDeque::with_capacity(capacity),
                capacity,
                subscribers: Vec::new(),
                next_id: 0,
            })),
            delivery: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Newest first.
    pub fn logs(&self) -> Vec<AutomationLog> {
        self.lock().logs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().logs.is_empty()
    }

    /// Insert at the front, evict past capacity, then notify subscribers.
    pub fn push(&self, log: AutomationLog) {
        let _delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let (snapshot, subscribers) = {
            let mut state = self.lock();
            state.logs.push_front(log);
            let capacity = state.capacity;
            state.logs.truncate(capacity);
            Self::snapshot(&state)
        };
        Self::broadcast(&snapshot, &subscribers);
    }

    /// Register `callback`. It is called right away with the current list.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[AutomationLog]) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let _delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let (id, snapshot) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push((id, callback.clone()));
            (id, state.logs.iter().cloned().collect::<Vec<_>>())
        };
        callback(&snapshot);
        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Re-broadcast the current list to every subscriber.
    pub fn notify(&self) {
        let _delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let (snapshot, subscribers) = Self::snapshot(&self.lock());
        Self::broadcast(&snapshot, &subscribers);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn snapshot(state: &LogState) -> (Vec<AutomationLog>, Vec<Callback>) {
        (
            state.logs.iter().cloned().collect(),
            state.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
        )
    }

    fn broadcast(snapshot: &[AutomationLog], subscribers: &[Callback]) {
        for callback in subscribers {
            callback(snapshot);
        }
    }
}

/// Handle returned by [`AutomationLogStore::subscribe`].
///
/// Dropping it keeps the subscription alive; call [`Subscription::unsubscribe`]
/// to stop receiving updates.
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<LogState>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
