use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::domain::{ActivityId, FormId};

fn gate_for<K>(gates: &Mutex<HashMap<K, Arc<RwLock<()>>>>, key: &K) -> Arc<RwLock<()>>
where
    K: std::hash::Hash + Eq + Clone,
{
    let mut guard = gates.lock().unwrap_or_else(PoisonError::into_inner);
    guard.entry(key.clone()).or_default().clone()
}

/// Reader/writer gates for schema changes.
///
/// Per form: submissions share the read side and field edits take the write side, so fields
/// never change underneath an in-flight submission. Per activity: creating forms or the stage
/// pipeline is exclusive, so the one-per-kind and define-once checks hold until commit.
#[derive(Debug, Default)]
pub struct SchemaLocks {
    forms: Mutex<HashMap<FormId, Arc<RwLock<()>>>>,
    activities: Mutex<HashMap<ActivityId, Arc<RwLock<()>>>>,
}

impl SchemaLocks {
    pub fn with_read<T>(&self, form_id: &FormId, work: impl FnOnce() -> T) -> T {
        let lock = gate_for(&self.forms, form_id);
        let _reading = lock.read().unwrap_or_else(PoisonError::into_inner);
        work()
    }

    pub fn with_write<T>(&self, form_id: &FormId, work: impl FnOnce() -> T) -> T {
        let lock = gate_for(&self.forms, form_id);
        let _writing = lock.write().unwrap_or_else(PoisonError::into_inner);
        work()
    }

    /// Exclusive section for schema writes scoped to one activity.
    pub fn with_activity<T>(&self, activity_id: &ActivityId, work: impl FnOnce() -> T) -> T {
        let lock = gate_for(&self.activities, activity_id);
        let _writing = lock.write().unwrap_or_else(PoisonError::into_inner);
        work()
    }
}
