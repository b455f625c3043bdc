//! Single-threaded cooperative task scheduler.
//!
//! Every piece of periodic work on the node is a [`Task`] registered with a
//! [`Scheduler`].  A task runs to completion and then either asks to be
//! woken again ([`Rearm::After`]) or goes quiet ([`Rearm::Done`]) until
//! somebody else plans it.  Each handle has at most one pending fire:
//! planning an already-armed handle replaces its wake time.
//!
//! [`CoopScheduler`] is the run loop used by the binary and by the tests.
//! It owns a virtual clock that the caller advances; nothing in here sleeps.

use tracing::debug;

use crate::clock::Tick;

// ---------------------------------------------------------------------------
// Task identities
// ---------------------------------------------------------------------------

/// Every kind of task body the node knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Temperature,
    Soil,
    Light,
    Water,
    Battery,
    /// Fast-cadence soil variant (poll-and-skip).
    WateringSoil,
    /// Fast-cadence water variant (poll-and-skip).
    WateringWater,
    PumpCycle,
    Countdown,
    FastModeExpiry,
}

/// Handle returned by [`Scheduler::register`].
///
/// Slots are recycled, so the generation keeps an old handle from reaching a
/// task registered later in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

/// What a task body wants after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    /// Wake this task again `ms` milliseconds from now.
    After(u64),
    /// Leave the handle as it is.  Anything the body planned itself stands.
    Done,
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

pub trait Scheduler {
    fn now(&self) -> Tick;

    /// Register a task without arming it.
    fn register(&mut self, task: Task) -> TaskId;

    /// Arm `id` to fire at `at`, replacing any pending fire.
    fn plan_absolute(&mut self, id: TaskId, at: Tick);

    fn unregister(&mut self, id: TaskId);

    fn plan_relative(&mut self, id: TaskId, ms: u64) {
        let at = self.now().after(ms);
        self.plan_absolute(id, at);
    }

    fn plan_now(&mut self, id: TaskId) {
        let now = self.now();
        self.plan_absolute(id, now);
    }
}

// ---------------------------------------------------------------------------
// Cooperative run loop
// ---------------------------------------------------------------------------

struct Entry {
    task: Task,
    due: Option<Tick>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct CoopScheduler {
    now: Tick,
    slots: Vec<Slot>,
}

impl CoopScheduler {
    pub fn new(now: Tick) -> Self {
        Self {
            now,
            slots: Vec::new(),
        }
    }

    /// Move the clock forward.  Going backwards is ignored: the clock is
    /// monotonic.
    pub fn advance_to(&mut self, now: Tick) {
        if now.has_reached(self.now) {
            self.now = now;
        }
    }

    /// Earliest pending wake time, if any task is armed.
    pub fn next_deadline(&self) -> Option<Tick> {
        let now = self.now;
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref().and_then(|e| e.due))
            .min_by_key(|due| due.since(now))
    }

    /// Whether `id` currently has a pending fire.
    #[cfg(test)]
    pub fn is_armed(&self, id: TaskId) -> bool {
        self.entry(id).is_some_and(|e| e.due.is_some())
    }

    /// Pending wake time of `id`.
    #[cfg(test)]
    pub fn due(&self, id: TaskId) -> Option<Tick> {
        self.entry(id).and_then(|e| e.due)
    }

    #[cfg(test)]
    pub fn is_registered(&self, id: TaskId) -> bool {
        self.entry(id).is_some()
    }

    /// Take the most overdue task whose wake time has been reached.  Ties go
    /// to the task registered first.  The pending fire is consumed.
    pub fn pop_due(&mut self) -> Option<(TaskId, Task)> {
        let now = self.now;
        let (index, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let due = s.entry.as_ref()?.due?;
                now.has_reached(due).then_some((i, due.since(now)))
            })
            .min_by_key(|&(i, lateness)| (lateness, i))?;

        let slot = &mut self.slots[index];
        let entry = slot.entry.as_mut()?;
        entry.due = None;
        Some((
            TaskId {
                index: index as u32,
                generation: slot.generation,
            },
            entry.task,
        ))
    }

    /// Run every task that is due at the current time, including tasks made
    /// due by other tasks during this pass.  `body` runs one task; its
    /// [`Rearm`] answer is applied to that task's handle.
    pub fn run_due<F>(&mut self, mut body: F) -> usize
    where
        F: FnMut(&mut Self, TaskId, Task) -> Rearm,
    {
        let mut ran = 0;
        while let Some((id, task)) = self.pop_due() {
            ran += 1;
            if let Rearm::After(ms) = body(self, id, task) {
                self.plan_relative(id, ms);
            }
        }
        ran
    }

    #[cfg(test)]
    fn entry(&self, id: TaskId) -> Option<&Entry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: TaskId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }
}

impl Scheduler for CoopScheduler {
    fn now(&self) -> Tick {
        self.now
    }

    fn register(&mut self, task: Task) -> TaskId {
        let entry = Entry { task, due: None };

        if let Some(index) = self.slots.iter().position(|s| s.entry.is_none()) {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.entry = Some(entry);
            return TaskId {
                index: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        TaskId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn plan_absolute(&mut self, id: TaskId, at: Tick) {
        match self.entry_mut(id) {
            Some(entry) => entry.due = Some(at),
            None => debug!(?id, %at, "plan on unregistered task ignored"),
        }
    }

    fn unregister(&mut self, id: TaskId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            debug!(?id, "unregister of unknown task ignored");
            return;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            debug!(?id, "unregister of stale task ignored");
            return;
        }
        slot.entry = None;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
