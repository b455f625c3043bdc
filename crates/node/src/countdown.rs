//! One-second ticker that logs the remaining pump-on time.
//!
//! The task handle is registered on first use and re-armed by every pump
//! activation.  When the count reaches zero the task stops planning itself;
//! the handle stays registered for the next activation.

use crate::node::{Ctx, SystemState};
use crate::scheduler::{Rearm, Task, TaskId};

const STEP_MS: u64 = 1_000;

#[derive(Debug, Default)]
pub(crate) struct Countdown {
    remaining: u32,
    task: Option<TaskId>,
}

#[cfg(test)]
impl Countdown {
    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }

    pub(crate) fn task(&self) -> Option<TaskId> {
        self.task
    }
}

/// Reset to the configured start value and tick now.
pub(crate) fn restart(st: &mut SystemState, ctx: &mut Ctx<'_>) {
    st.countdown.remaining = st.timing.countdown_start;
    let id = *st
        .countdown
        .task
        .get_or_insert_with(|| ctx.sched.register(Task::Countdown));
    ctx.sched.plan_now(id);
}

/// Stop ticking and release the handle.
pub(crate) fn cancel(st: &mut SystemState, ctx: &mut Ctx<'_>) {
    if let Some(id) = st.countdown.task.take() {
        ctx.sched.unregister(id);
    }
    st.countdown.remaining = 0;
}

pub(crate) fn tick_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if st.countdown.remaining == 0 {
        return Rearm::Done;
    }
    ctx.log(format!("Pump ON - {}s remaining", st.countdown.remaining));
    st.countdown.remaining -= 1;
    Rearm::After(STEP_MS)
}

// ===========================================================================
// Tests
// ===========================================================================
