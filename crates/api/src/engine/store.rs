//! Concurrent registry of jobs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use semi_core::types::JobId;

use super::record::{JobRecord, SharedEntry};

/// `JobId -> JobEntry` behind a read/write lock.
///
/// The map lock is held only long enough to insert, look up or remove an
/// entry. Record state is guarded by each entry's own mutex.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, SharedEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: SharedEntry) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.id, entry);
    }

    pub fn get(&self, id: JobId) -> Option<SharedEntry> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: JobId) -> Option<SharedEntry> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Remove every entry whose record satisfies `predicate`.
    ///
    /// The predicate runs with the map write lock and the record lock held,
    /// so nothing can look a job up or lease it between the check and the
    /// removal. It may mutate the record (the reaper marks it reaped).
    pub fn remove_if(&self, mut predicate: impl FnMut(&mut JobRecord) -> bool) -> Vec<SharedEntry> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<JobId> = jobs
            .values()
            .filter(|entry| predicate(&mut entry.lock()))
            .map(|entry| entry.id)
            .collect();
        doomed.iter().filter_map(|id| jobs.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::tests::entry;
    use chrono::Utc;
    use semi_core::job_status::JobStatus;
    use std::sync::Arc;

    #[test]
    fn insert_get_remove() {
        let store = JobStore::new();
        let job = Arc::new(entry(&["a.jpg"], None));
        let id = job.id;
        store.insert(job);

        assert!(store.get(id).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(id).is_some());
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_id_is_absent() {
        assert!(JobStore::new().get(JobId::new()).is_none());
    }

    #[test]
    fn remove_if_only_takes_matching_records() {
        let store = JobStore::new();
        let finished = Arc::new(entry(&["a.jpg"], None));
        let queued = Arc::new(entry(&["b.jpg"], None));
        finished
            .lock()
            .transition(JobStatus::Cancelled, Utc::now())
            .unwrap();
        store.insert(finished.clone());
        store.insert(queued.clone());

        let removed = store.remove_if(|record| {
            let terminal = record.status.is_terminal();
            if terminal {
                record.reaped = true;
            }
            terminal
        });

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, finished.id);
        assert!(finished.lock().reaped);
        assert!(store.get(finished.id).is_none());
        assert!(store.get(queued.id).is_some());
    }
}
