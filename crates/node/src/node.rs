//! The node's single state aggregate and the task dispatch around it.
//!
//! All control state lives in one [`SystemState`] owned by the run loop.
//! Task bodies and command handlers borrow it exclusively for the duration
//! of one run, together with a [`Ctx`] carrying the scheduler, the drivers
//! and the publisher.

use tracing::{info, warn};

use crate::clock::Tick;
use crate::config::Timing;
use crate::countdown::{self, Countdown};
use crate::drivers::Hardware;
use crate::mode::{self, ModeController};
use crate::pump::{self, PumpActuator};
use crate::router::{self, Command};
use crate::scheduler::{CoopScheduler, Rearm, Scheduler, Task, TaskId};
use crate::sensor::{self, Readings};
use crate::telemetry::{topics, Payload, Publish};

/// First run of each periodic task after boot, staggered so they do not all
/// hit the ADC at once.
const TEMP_FIRST_MS: u64 = 1_000;
const SOIL_FIRST_MS: u64 = 2_000;
const LIGHT_FIRST_MS: u64 = 3_000;
const WATER_FIRST_MS: u64 = 4_000;

const BOOT_LED_PULSE_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub(crate) struct Ctx<'a> {
    pub(crate) sched: &'a mut dyn Scheduler,
    pub(crate) hw: &'a mut dyn Hardware,
    pub(crate) out: &'a mut dyn Publish,
}

impl Ctx<'_> {
    pub(crate) fn now(&self) -> Tick {
        self.sched.now()
    }

    pub(crate) fn publish(&mut self, topic: &str, payload: Payload) {
        self.out.publish(topic, payload);
    }

    /// Human-readable event: traced locally and sent on the `log` topic.
    pub(crate) fn log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        info!(target: "smartpot", "{msg}");
        self.out.publish(topics::LOG, Payload::Text(msg));
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Handles of the tasks registered at boot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskTable {
    pub(crate) temperature: TaskId,
    pub(crate) soil: TaskId,
    pub(crate) light: TaskId,
    pub(crate) water: TaskId,
    pub(crate) battery: TaskId,
    pub(crate) watering_soil: TaskId,
    pub(crate) watering_water: TaskId,
}

pub(crate) struct SystemState {
    pub(crate) timing: Timing,
    pub(crate) readings: Readings,
    pub(crate) modes: ModeController,
    pub(crate) pump: PumpActuator,
    pub(crate) countdown: Countdown,
    pub(crate) tasks: TaskTable,
}

impl SystemState {
    /// Bring the node up: relay open, LED pulse, periodic tasks registered at
    /// their first offsets.  The fast-cadence tasks are registered unarmed;
    /// the pump, countdown and expiry tasks are registered on first use.
    pub(crate) fn boot(timing: Timing, ctx: &mut Ctx<'_>) -> Self {
        ctx.hw.set_relay(false);

        let sched = &mut *ctx.sched;
        let tasks = TaskTable {
            temperature: sched.register(Task::Temperature),
            soil: sched.register(Task::Soil),
            light: sched.register(Task::Light),
            water: sched.register(Task::Water),
            battery: sched.register(Task::Battery),
            watering_soil: sched.register(Task::WateringSoil),
            watering_water: sched.register(Task::WateringWater),
        };
        sched.plan_relative(tasks.temperature, TEMP_FIRST_MS);
        sched.plan_relative(tasks.soil, SOIL_FIRST_MS);
        sched.plan_relative(tasks.light, LIGHT_FIRST_MS);
        sched.plan_relative(tasks.water, WATER_FIRST_MS);
        sched.plan_relative(tasks.battery, timing.battery_interval_ms);

        ctx.hw.pulse_led(BOOT_LED_PULSE_MS);
        info!(?timing, "node booted");

        Self {
            timing,
            readings: Readings::default(),
            modes: ModeController::default(),
            pump: PumpActuator::default(),
            countdown: Countdown::default(),
            tasks,
        }
    }

    /// Run one task body.
    pub(crate) fn run_task(&mut self, task: Task, ctx: &mut Ctx<'_>) -> Rearm {
        match task {
            Task::Temperature => sensor::temperature_task(self, ctx),
            Task::Soil => sensor::soil_task(self, ctx),
            Task::Light => sensor::light_task(self, ctx),
            Task::Water => sensor::water_task(self, ctx),
            Task::Battery => sensor::battery_task(self, ctx),
            Task::WateringSoil => sensor::watering_soil_task(self, ctx),
            Task::WateringWater => sensor::watering_water_task(self, ctx),
            Task::PumpCycle => pump::cycle_task(self, ctx),
            Task::Countdown => countdown::tick_task(self, ctx),
            Task::FastModeExpiry => mode::expiry_task(self, ctx),
        }
    }

    pub(crate) fn handle(&mut self, cmd: Command, ctx: &mut Ctx<'_>) {
        router::dispatch(self, cmd, ctx);
    }

    /// Handle a message from the transport.  Unparseable messages are logged
    /// and dropped.
    pub(crate) fn handle_message(&mut self, topic: &str, payload: &Payload, ctx: &mut Ctx<'_>) {
        match Command::from_message(topic, payload) {
            Ok(cmd) => self.handle(cmd, ctx),
            Err(e) => warn!(%topic, "ignoring message: {e}"),
        }
    }
}

/// Run everything due at the scheduler's current time.
pub(crate) fn run_due(
    state: &mut SystemState,
    sched: &mut CoopScheduler,
    hw: &mut dyn Hardware,
    out: &mut dyn Publish,
) -> usize {
    sched.run_due(|sched, _id, task| {
        let mut ctx = Ctx {
            sched,
            hw: &mut *hw,
            out: &mut *out,
        };
        state.run_task(task, &mut ctx)
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Channel;
    use crate::testkit::Harness;

    // -- Boot ------------------------------------------------------------------------

    #[test]
    fn boot_opens_relay_and_pulses_led() {
        let h = Harness::new();
        assert!(!h.hw.relay_closed);
        assert_eq!(h.hw.relay_commands, vec![false]);
        assert_eq!(h.hw.led_pulses, vec![1_000]);
    }

    #[test]
    fn boot_staggers_periodic_tasks() {
        let h = Harness::new();
        let t = h.state.tasks;
        assert_eq!(h.sched.due(t.temperature), Some(Tick::from_millis(1_000)));
        assert_eq!(h.sched.due(t.soil), Some(Tick::from_millis(2_000)));
        assert_eq!(h.sched.due(t.light), Some(Tick::from_millis(3_000)));
        assert_eq!(h.sched.due(t.water), Some(Tick::from_millis(4_000)));
        assert_eq!(h.sched.due(t.battery), Some(Tick::from_millis(3_600_000)));
        assert!(!h.sched.is_armed(t.watering_soil));
        assert!(!h.sched.is_armed(t.watering_water));
    }

    #[test]
    fn boot_state_is_idle() {
        let h = Harness::new();
        assert!(!h.state.pump.state().is_on());
        assert!(!h.state.modes.mode(Channel::Soil).is_fast());
        assert!(!h.state.modes.mode(Channel::Water).is_fast());
        assert_eq!(h.state.countdown.task(), None);
        assert_eq!(h.state.modes.expiry_task(), None);
    }

    // -- End-to-end scenarios --------------------------------------------------------

    #[test]
    fn remote_on_with_full_reservoir() {
        let mut h = Harness::new();
        h.hw.water = Some(2.0);
        h.advance(4_000);
        h.out.clear();

        h.inbound("pump/-/set/state", Payload::Int(1));

        assert!(h.state.pump.state().is_on());
        assert!(h.hw.relay_closed);
        assert!(h.state.modes.mode(Channel::Soil).is_fast());
        assert!(h.state.modes.mode(Channel::Water).is_fast());
        assert_eq!(
            h.logs(),
            vec!["Pump ON (from gateway)", "Pump ON - 5s remaining"]
        );
    }

    #[test]
    fn remote_on_with_low_reservoir() {
        let mut h = Harness::new();
        h.hw.water = Some(1.2);
        h.advance(4_000);
        h.out.clear();

        h.inbound("pump/-/set/state", Payload::Int(1));

        assert!(!h.state.pump.state().is_on());
        assert!(!h.hw.relay_closed);
        assert!(!h.state.modes.mode(Channel::Soil).is_fast());
        assert_eq!(h.logs(), vec!["Pump NOT activated: Water LOW"]);
    }

    #[test]
    fn watering_off_during_fast_mode() {
        let mut h = Harness::new();
        h.inbound("watering/-/set/state", Payload::Int(1));
        h.advance(12_000);
        h.inbound("watering/-/set/state", Payload::Int(0));

        assert!(!h.state.modes.mode(Channel::Soil).is_fast());
        assert!(!h.state.modes.mode(Channel::Water).is_fast());
        assert_eq!(h.state.modes.expiry_task(), None);

        let fast = h.out.count(topics::SOIL_WATERING) + h.out.count(topics::WATER_WATERING);
        h.advance(200_000);
        assert_eq!(
            h.out.count(topics::SOIL_WATERING) + h.out.count(topics::WATER_WATERING),
            fast
        );
    }

    #[test]
    fn malformed_command_changes_nothing() {
        let mut h = Harness::new();
        h.hw.water = Some(2.0);
        h.advance(4_000);
        h.out.clear();

        h.inbound("pump/-/set/state", Payload::Text("ON".into()));
        h.inbound("pump/-/set/state", Payload::Int(7));
        h.inbound("unknown/topic", Payload::Int(1));

        assert!(!h.state.pump.state().is_on());
        assert!(h.logs().is_empty());
    }

    #[test]
    fn low_water_during_cycle_ends_everything_but_sampling() {
        let mut h = Harness::new();
        h.hw.water = Some(2.0);
        h.advance(4_000);
        h.inbound("pump/-/set/state", Payload::Int(1));

        // Two full on/rest rounds.
        h.advance(20_000);
        assert!(h.state.pump.is_cycling());

        h.hw.water = Some(1.0);
        h.advance(5_000);
        assert!(!h.state.pump.is_cycling());
        assert!(!h.hw.relay_closed);

        // Sampling carries on.
        let water = h.out.count(topics::WATER);
        h.advance(30_000);
        assert!(h.out.count(topics::WATER) > water);
    }
}
