//! FIFO admission under a concurrency cap.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use semi_core::error::CoreError;
use semi_core::types::JobId;

#[derive(Debug, Default)]
struct Slots {
    queue: VecDeque<JobId>,
    running: usize,
}

/// Bounded queue of job ids plus a counter of admitted jobs.
///
/// A job counts against `max_running` from the moment it is admitted until
/// its runner calls [`AdmissionQueue::release`].
#[derive(Debug)]
pub struct AdmissionQueue {
    slots: Mutex<Slots>,
    max_running: usize,
    capacity: usize,
}

impl AdmissionQueue {
    pub fn new(max_running: usize, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            max_running: max_running.max(1),
            capacity,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `id` to the tail. Fails once the queue holds `capacity` ids.
    pub fn enqueue(&self, id: JobId) -> Result<(), CoreError> {
        let mut slots = self.slots();
        if slots.queue.len() >= self.capacity {
            return Err(CoreError::Unavailable(format!(
                "Job queue is full ({} waiting), retry later",
                slots.queue.len()
            )));
        }
        slots.queue.push_back(id);
        Ok(())
    }

    /// Whether another submission would currently fit.
    pub fn has_capacity(&self) -> bool {
        self.slots().queue.len() < self.capacity
    }

    /// Drop `id` from the queue if it is still waiting there.
    pub fn forget(&self, id: JobId) -> bool {
        let mut slots = self.slots();
        let before = slots.queue.len();
        slots.queue.retain(|queued| *queued != id);
        slots.queue.len() != before
    }

    /// Pop queue heads while slots are free.
    ///
    /// `try_admit` runs with the queue lock held and decides whether the
    /// popped id still wants to run; ids it rejects (cancelled meanwhile,
    /// removed from the store) do not take a slot. Returns what was admitted,
    /// in queue order.
    pub fn admit<T>(&self, mut try_admit: impl FnMut(JobId) -> Option<T>) -> Vec<T> {
        let mut slots = self.slots();
        let mut admitted = Vec::new();
        while slots.running < self.max_running {
            let Some(id) = slots.queue.pop_front() else {
                break;
            };
            if let Some(job) = try_admit(id) {
                slots.running += 1;
                admitted.push(job);
            }
        }
        admitted
    }

    /// Give back the slot of a finished job.
    pub fn release(&self) {
        let mut slots = self.slots();
        slots.running = slots.running.saturating_sub(1);
    }

    /// 1-based position of `id` in the queue.
    pub fn position(&self, id: JobId) -> Option<usize> {
        self.slots()
            .queue
            .iter()
            .position(|queued| *queued == id)
            .map(|i| i + 1)
    }

    pub fn running(&self) -> usize {
        self.slots().running
    }

    pub fn queued(&self) -> usize {
        self.slots().queue.len()
    }
}
