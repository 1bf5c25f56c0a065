//! Admission control for concurrent runs.
//!
//! At most `capacity` executions run at once. Excess submissions wait in a FIFO
//! queue and are admitted as soon as a running execution reaches a terminal
//! state. Occupancy is published on a `watch` channel so callers can await free
//! capacity instead of polling.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::execution::Execution;

/// Snapshot of manager occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    /// Executions currently running.
    pub active: usize,

    /// Executions waiting for a slot.
    pub pending: usize,

    /// Executions that reached a terminal state since startup.
    pub finished: u64,
}

struct Slots {
    pending: VecDeque<Execution>,
    /// Run ids keyed by admission ticket.
    active: HashMap<u64, String>,
    next_ticket: u64,
    finished: u64,
}

impl Slots {
    fn occupancy(&self) -> Occupancy {
        Occupancy {
            active: self.active.len(),
            pending: self.pending.len(),
            finished: self.finished,
        }
    }
}

struct Inner {
    capacity: usize,
    slots: Mutex<Slots>,
    occupancy: watch::Sender<Occupancy>,
}

/// Bounds the number of concurrently active executions.
#[derive(Clone)]
pub struct ExecutionManager {
    inner: Arc<Inner>,
}

impl ExecutionManager {
    /// Create a manager admitting at most `capacity` executions at once.
    pub fn new(capacity: usize) -> Self {
        let (occupancy, _) = watch::channel(Occupancy::default());

        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                slots: Mutex::new(Slots {
                    pending: VecDeque::new(),
                    active: HashMap::new(),
                    next_ticket: 0,
                    finished: 0,
                }),
                occupancy,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Queue an execution and admit as many pending executions as capacity allows.
    pub async fn submit(&self, execution: Execution) {
        tracing::debug!(run_id = %execution.run_id(), "Execution submitted");

        let mut slots = self.inner.slots.lock().await;
        slots.pending.push_back(execution);
        self.admit(&mut slots);
    }

    /// Start pending executions in FIFO order while there is free capacity.
    /// Must be called with the slot lock held.
    fn admit(&self, slots: &mut Slots) {
        while slots.active.len() < self.inner.capacity {
            let Some(execution) = slots.pending.pop_front() else {
                break;
            };

            let ticket = slots.next_ticket;
            slots.next_ticket += 1;
            slots.active.insert(ticket, execution.run_id().to_string());

            tracing::info!(
                run_id = %execution.run_id(),
                active = slots.active.len(),
                pending = slots.pending.len(),
                "Execution admitted"
            );

            let manager = self.clone();
            let run_id = execution.run_id().to_string();
            tokio::spawn(async move {
                // A panicking run must still free its slot.
                match tokio::spawn(execution.run()).await {
                    Ok(outcome) => {
                        tracing::debug!(run_id = %run_id, ?outcome, "Execution finished");
                    }
                    Err(e) => {
                        tracing::error!(run_id = %run_id, error = %e, "Execution task aborted");
                    }
                }
                manager.release(ticket).await;
            });
        }

        self.inner.occupancy.send_replace(slots.occupancy());
    }

    async fn release(&self, ticket: u64) {
        let mut slots = self.inner.slots.lock().await;
        if slots.active.remove(&ticket).is_some() {
            slots.finished += 1;
        }
        self.admit(&mut slots);
    }

    /// True iff fewer than `capacity` executions are active.
    pub fn has_available_slots(&self) -> bool {
        self.inner.occupancy.borrow().active < self.inner.capacity
    }

    /// Wait until at least one slot is free.
    pub async fn wait_for_slot(&self) {
        let capacity = self.inner.capacity;
        let mut rx = self.inner.occupancy.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|o| o.active < capacity).await;
    }

    pub fn occupancy(&self) -> Occupancy {
        *self.inner.occupancy.borrow()
    }

    /// Wait until nothing is active or pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.occupancy.subscribe();
        let _ = rx.wait_for(|o| o.active == 0 && o.pending == 0).await;
    }
}
