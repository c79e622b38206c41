//! Deterministic [`TaskScheduler`] driven by a virtual clock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::collaborators::{ManagerTask, TaskScheduler, TimeoutKind};
use crate::manager::MissionListManager;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntrySlot {
    Anonymous,
    Named(String),
    Event(TimeoutKind, u64),
}

#[derive(Debug, Clone)]
struct ScheduledEntry {
    due_ms: u64,
    seq: u64,
    slot: EntrySlot,
    task: ManagerTask,
}

#[derive(Debug, Default)]
struct ManualSchedulerState {
    now_ms: u64,
    next_seq: u64,
    entries: Vec<ScheduledEntry>,
}

impl ManualSchedulerState {
    fn push(&mut self, slot: EntrySlot, task: ManagerTask, delay: Duration) {
        if slot != EntrySlot::Anonymous {
            self.entries.retain(|entry| entry.slot != slot);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.entries.push(ScheduledEntry {
            due_ms: self.now_ms.saturating_add(delay_ms),
            seq,
            slot,
            task,
        });
    }

    fn earliest_due_at_or_before(&self, limit_ms: u64) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due_ms <= limit_ms)
            .min_by_key(|(_, entry)| (entry.due_ms, entry.seq))
            .map(|(position, _)| position)
    }
}

/// Scheduler whose time only moves when told to.
///
/// Tasks run in `(due time, post order)` order. Cloning shares the queue.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualSchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        lock_unpoisoned(&self.state).now_ms
    }

    pub fn pending_len(&self) -> usize {
        lock_unpoisoned(&self.state).entries.len()
    }

    pub fn pending_names(&self) -> Vec<String> {
        lock_unpoisoned(&self.state)
            .entries
            .iter()
            .filter_map(|entry| match &entry.slot {
                EntrySlot::Named(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_named_task(&self, name: &str) -> bool {
        self.pending_names().iter().any(|pending| pending == name)
    }

    pub fn has_event(&self, kind: TimeoutKind, event_id: u64) -> bool {
        lock_unpoisoned(&self.state)
            .entries
            .iter()
            .any(|entry| entry.slot == EntrySlot::Event(kind, event_id))
    }

    /// Removes the next task due at the current time.
    pub fn pop_due(&self) -> Option<ManagerTask> {
        let mut state = lock_unpoisoned(&self.state);
        let now = state.now_ms;
        let position = state.earliest_due_at_or_before(now)?;
        Some(state.entries.remove(position).task)
    }

    /// Runs every task due now, including ones posted while running. Returns the count.
    pub fn run_due(&self, manager: &mut MissionListManager) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due() {
            manager.handle_task(task);
            ran += 1;
        }
        ran
    }

    /// Advances the clock by `delta_ms`, running tasks as their time comes.
    pub fn advance(&self, manager: &mut MissionListManager, delta_ms: u64) -> usize {
        let target = self.now_ms().saturating_add(delta_ms);
        let mut ran = self.run_due(manager);
        loop {
            let task = {
                let mut state = lock_unpoisoned(&self.state);
                let Some(position) = state.earliest_due_at_or_before(target) else {
                    state.now_ms = target;
                    break;
                };
                let entry = state.entries.remove(position);
                state.now_ms = state.now_ms.max(entry.due_ms);
                entry.task
            };
            manager.handle_task(task);
            ran += 1;
        }
        ran + self.run_due(manager)
    }
}

impl TaskScheduler for ManualScheduler {
    fn post_task(&self, task: ManagerTask) {
        lock_unpoisoned(&self.state).push(EntrySlot::Anonymous, task, Duration::ZERO);
    }

    fn post_named_task(&self, name: &str, task: ManagerTask, delay: Duration) {
        lock_unpoisoned(&self.state).push(EntrySlot::Named(name.to_string()), task, delay);
    }

    fn remove_task(&self, name: &str) {
        let slot = EntrySlot::Named(name.to_string());
        lock_unpoisoned(&self.state)
            .entries
            .retain(|entry| entry.slot != slot);
    }

    fn send_event(&self, kind: TimeoutKind, event_id: u64, delay: Duration) {
        lock_unpoisoned(&self.state).push(
            EntrySlot::Event(kind, event_id),
            ManagerTask::Timeout { kind, event_id },
            delay,
        );
    }

    fn remove_event(&self, kind: TimeoutKind, event_id: u64) {
        let slot = EntrySlot::Event(kind, event_id);
        lock_unpoisoned(&self.state)
            .entries
            .retain(|entry| entry.slot != slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_named_tasks_coalesce_and_events_remove_by_key() {
        let scheduler = ManualScheduler::new();
        scheduler.post_named_task("startWaitingAbility", ManagerTask::StartWaitingAbility, Duration::from_millis(10));
        scheduler.post_named_task("startWaitingAbility", ManagerTask::StartWaitingAbility, Duration::from_millis(20));
        scheduler.send_event(TimeoutKind::Load, 4, Duration::from_millis(5));
        assert_eq!(scheduler.pending_len(), 2);
        assert!(scheduler.has_event(TimeoutKind::Load, 4));

        scheduler.remove_event(TimeoutKind::Load, 4);
        assert!(!scheduler.has_event(TimeoutKind::Load, 4));
        assert_eq!(scheduler.pending_names(), vec!["startWaitingAbility".to_string()]);
        assert!(scheduler.pop_due().is_none());
    }

    #[test]
    fn unit_pop_due_orders_by_time_then_post_order() {
        let scheduler = ManualScheduler::new();
        scheduler.post_task(ManagerTask::BackToLauncher);
        scheduler.post_task(ManagerTask::SpecifiedTimeout);
        assert_eq!(scheduler.pop_due(), Some(ManagerTask::BackToLauncher));
        assert_eq!(scheduler.pop_due(), Some(ManagerTask::SpecifiedTimeout));
        assert_eq!(scheduler.pop_due(), None);
    }
}
