//! Fast/normal sampling cadence for the soil and water channels.
//!
//! ```text
//! Normal ──[watering ON | pump cycle]──▶ Fast{until}
//!   ▲                                      │  │
//!   │                                      │  └─[re-trigger]─▶ Fast{until'}  (deadline extended)
//!   └──────[expiry fires | watering OFF]───┘
//! ```
//!
//! Both channels share one expiry task.  Re-triggering re-plans that task to
//! the new absolute deadline, so there is never more than one pending expiry.

use tracing::debug;

use crate::clock::Tick;
use crate::node::{Ctx, SystemState};
use crate::scheduler::{Rearm, Task, TaskId};

/// Channels that have a fast cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Soil,
    Water,
}

/// Per-channel cadence.  Fast mode always carries its expiry deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SamplingMode {
    #[default]
    Normal,
    Fast {
        until: Tick,
    },
}

impl SamplingMode {
    pub(crate) fn fast_expiry(self) -> Option<Tick> {
        match self {
            Self::Normal => None,
            Self::Fast { until } => Some(until),
        }
    }

    pub(crate) fn is_fast(self) -> bool {
        self.fast_expiry().is_some()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ModeController {
    soil: SamplingMode,
    water: SamplingMode,
    /// Shared expiry task.  `None` until first armed, and again after an
    /// explicit watering OFF cancelled it.
    expiry_task: Option<TaskId>,
}

impl ModeController {
    pub(crate) fn mode(&self, channel: Channel) -> SamplingMode {
        match channel {
            Channel::Soil => self.soil,
            Channel::Water => self.water,
        }
    }

    #[cfg(test)]
    pub(crate) fn expiry_task(&self) -> Option<TaskId> {
        self.expiry_task
    }

    fn set(&mut self, channel: Channel, mode: SamplingMode) {
        match channel {
            Channel::Soil => self.soil = mode,
            Channel::Water => self.water = mode,
        }
    }

    fn clear(&mut self) {
        self.soil = SamplingMode::Normal;
        self.water = SamplingMode::Normal;
    }
}

/// Put `channel` in fast mode until `now + fast_mode_duration`, kick its
/// fast task immediately and move the shared expiry to the new deadline.
pub(crate) fn activate_fast(st: &mut SystemState, channel: Channel, ctx: &mut Ctx<'_>) {
    let until = ctx.now().after(st.timing.fast_mode_duration_ms);
    st.modes.set(channel, SamplingMode::Fast { until });

    let fast_task = match channel {
        Channel::Soil => st.tasks.watering_soil,
        Channel::Water => st.tasks.watering_water,
    };
    ctx.sched.plan_now(fast_task);

    let expiry = *st
        .modes
        .expiry_task
        .get_or_insert_with(|| ctx.sched.register(Task::FastModeExpiry));
    ctx.sched.plan_absolute(expiry, until);
    debug!(?channel, %until, "fast mode armed");
}

/// Start or extend the fast-watering session on both channels.
pub(crate) fn enter_fast(st: &mut SystemState, ctx: &mut Ctx<'_>) {
    activate_fast(st, Channel::Soil, ctx);
    activate_fast(st, Channel::Water, ctx);
}

/// Explicit watering OFF: back to normal now, and drop the pending expiry so
/// it cannot fire later on an already-cleared session.
pub(crate) fn exit_fast(st: &mut SystemState, ctx: &mut Ctx<'_>) {
    st.modes.clear();
    if let Some(id) = st.modes.expiry_task.take() {
        ctx.sched.unregister(id);
    }
}

/// Body of the shared expiry task.
pub(crate) fn expiry_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    st.modes.clear();
    ctx.log("Watering mode ended");
    Rearm::Done
}

// ===========================================================================
// Tests
// ===========================================================================
