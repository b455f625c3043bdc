//! Pump actuation, the low-water interlock and the repeating pump cycle.
//!
//! ## Cycle
//!
//! ```text
//! Off ──[activate]──▶ On ──[on-time elapsed]──▶ Resting ──[on-time elapsed]──▶ On ...
//!  ▲                   │                           │
//!  └──[OFF command | low water]────────────────────┘
//! ```
//!
//! Once started, the cycle keeps alternating on the pump task until an
//! explicit OFF or an interlock trip ends it.  The fast-mode session expiring
//! does not stop it.

use tracing::{debug, warn};

use crate::clock::Tick;
use crate::countdown;
use crate::mode;
use crate::node::{Ctx, SystemState};
use crate::scheduler::{Rearm, Task, TaskId};
use crate::sensor::WaterLevel;

/// Who asked for the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActivationSource {
    Button,
    RemoteCommand,
    /// The pump cycle turning itself back on.  Not gated by the interlock.
    CycleRearm,
}

impl ActivationSource {
    fn gated(self) -> bool {
        !matches!(self, Self::CycleRearm)
    }

    fn on_message(self) -> &'static str {
        match self {
            Self::Button => "Pump ON (button)",
            Self::RemoteCommand => "Pump ON (from gateway)",
            Self::CycleRearm => "Pump ON (cycle)",
        }
    }

    fn rejected_message(self) -> &'static str {
        match self {
            Self::Button => "Pump NOT activated (button): Water LOW",
            _ => "Pump NOT activated: Water LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub(crate) enum Activation {
    Started,
    Rejected,
}

/// Why the pump was forced off.  Neither reason re-arms the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shutdown {
    Remote,
    LowWater,
}

impl Shutdown {
    fn message(self) -> &'static str {
        match self {
            Self::Remote => "Pump OFF (from gateway)",
            Self::LowWater => "Pump OFF (auto: low water)",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// `on` and `active_mode` are only ever written together, through
/// [`PumpState::start`] and [`PumpState::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct PumpState {
    on: bool,
    active_mode: bool,
    shutoff_deadline: Option<Tick>,
}

impl PumpState {
    pub(crate) fn is_on(&self) -> bool {
        self.on
    }

    pub(crate) fn active_mode(&self) -> bool {
        self.active_mode
    }

    pub(crate) fn shutoff_deadline(&self) -> Option<Tick> {
        self.shutoff_deadline
    }

    fn start(&mut self, shutoff: Tick) {
        self.on = true;
        self.active_mode = true;
        self.shutoff_deadline = Some(shutoff);
    }

    fn stop(&mut self) {
        self.on = false;
        self.active_mode = false;
        self.shutoff_deadline = None;
    }
}

#[derive(Debug, Default)]
pub(crate) struct PumpActuator {
    state: PumpState,
    /// The on/off rhythm is running.
    cycling: bool,
    task: Option<TaskId>,
}

impl PumpActuator {
    pub(crate) fn state(&self) -> PumpState {
        self.state
    }

    pub(crate) fn is_cycling(&self) -> bool {
        self.cycling
    }

    #[cfg(test)]
    pub(crate) fn task(&self) -> Option<TaskId> {
        self.task
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Turn the pump on for one on-time, unless the reservoir is low and the
/// request is gated.
pub(crate) fn activate(
    st: &mut SystemState,
    source: ActivationSource,
    ctx: &mut Ctx<'_>,
) -> Activation {
    if source.gated() && st.readings.water_level() == WaterLevel::Low {
        ctx.log(source.rejected_message());
        return Activation::Rejected;
    }

    let on_time = st.timing.pump_on_time_ms;
    ctx.hw.set_relay(true);
    st.pump.state.start(ctx.now().after(on_time));
    st.pump.cycling = true;
    ctx.log(source.on_message());

    let state = st.pump.state();
    debug!(
        ?source,
        active_mode = state.active_mode(),
        shutoff = ?state.shutoff_deadline(),
        "pump started"
    );

    countdown::restart(st, ctx);

    let id = *st
        .pump
        .task
        .get_or_insert_with(|| ctx.sched.register(Task::PumpCycle));
    ctx.sched.plan_relative(id, on_time);

    mode::enter_fast(st, ctx);
    Activation::Started
}

/// Force the pump off and end the cycle.
pub(crate) fn shutdown(st: &mut SystemState, reason: Shutdown, ctx: &mut Ctx<'_>) {
    ctx.hw.set_relay(false);
    st.pump.state.stop();
    st.pump.cycling = false;
    if let Some(id) = st.pump.task.take() {
        ctx.sched.unregister(id);
    }
    countdown::cancel(st, ctx);
    ctx.log(reason.message());
}

/// Body of the pump task: end the current on-time and rest, or start the
/// next on-time after a rest.
pub(crate) fn cycle_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if st.pump.state.is_on() {
        ctx.hw.set_relay(false);
        st.pump.state.stop();
        ctx.log("Pump OFF");

        mode::enter_fast(st, ctx);
        ctx.log(format!(
            "Watering mode active - fast updates for {}s",
            st.timing.fast_mode_duration_ms / 1_000
        ));
        return Rearm::After(st.timing.pump_on_time_ms);
    }

    if st.pump.is_cycling() {
        let level = st.readings.water_level();
        if level == WaterLevel::Low {
            warn!(%level, "pump cycle restarting on a low reservoir reading");
        }
        let _ = activate(st, ActivationSource::CycleRearm, ctx);
    } else {
        debug!("pump task fired with no cycle running");
    }
    Rearm::Done
}

// ===========================================================================
// Tests
// ===========================================================================
