//! Test doubles and a harness that drives the node on a virtual clock.

use crate::clock::Tick;
use crate::config::Timing;
use crate::drivers::{AdcChannel, Hardware};
use crate::node::{self, Ctx, SystemState};
use crate::router::Command;
use crate::scheduler::{CoopScheduler, Scheduler};
use crate::telemetry::{topics, Payload, Publish};

// ---------------------------------------------------------------------------
// Fake drivers
// ---------------------------------------------------------------------------

/// Drivers returning whatever the test put in the fields.  `None` makes the
/// corresponding read fail.
pub(crate) struct FakeHardware {
    pub(crate) soil: Option<f32>,
    pub(crate) water: Option<f32>,
    pub(crate) light: Option<f32>,
    pub(crate) temperature: Option<f32>,
    pub(crate) battery: Option<u8>,
    pub(crate) relay_closed: bool,
    pub(crate) relay_commands: Vec<bool>,
    pub(crate) led_pulses: Vec<u64>,
}

impl Default for FakeHardware {
    fn default() -> Self {
        Self {
            soil: Some(2.0),
            water: Some(2.0),
            light: Some(1.0),
            temperature: Some(20.0),
            battery: Some(90),
            relay_closed: false,
            relay_commands: Vec::new(),
            led_pulses: Vec::new(),
        }
    }
}

impl Hardware for FakeHardware {
    fn measure(&mut self, channel: AdcChannel) -> Option<f32> {
        match channel {
            AdcChannel::Soil => self.soil,
            AdcChannel::Water => self.water,
            AdcChannel::Light => self.light,
        }
    }

    fn set_relay(&mut self, closed: bool) {
        self.relay_closed = closed;
        self.relay_commands.push(closed);
    }

    fn temperature_c(&mut self) -> Option<f32> {
        self.temperature
    }

    fn battery_percent(&mut self) -> Option<u8> {
        self.battery
    }

    fn pulse_led(&mut self, ms: u64) {
        self.led_pulses.push(ms);
    }
}

// ---------------------------------------------------------------------------
// Recording publisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) messages: Vec<(String, Payload)>,
}

impl Recorder {
    pub(crate) fn last(&self, topic: &str) -> Option<Payload> {
        self.messages
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
    }

    pub(crate) fn count(&self, topic: &str) -> usize {
        self.messages.iter().filter(|(t, _)| t == topic).count()
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Publish for Recorder {
    fn publish(&mut self, topic: &str, payload: Payload) {
        self.messages.push((topic.to_string(), payload));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub(crate) sched: CoopScheduler,
    pub(crate) hw: FakeHardware,
    pub(crate) out: Recorder,
    pub(crate) state: SystemState,
}

impl Harness {
    /// A freshly booted node at t = 0 with default timing.
    pub(crate) fn new() -> Self {
        Self::with_timing(Timing::default())
    }

    pub(crate) fn with_timing(timing: Timing) -> Self {
        let mut sched = CoopScheduler::new(Tick::ZERO);
        let mut hw = FakeHardware::default();
        let mut out = Recorder::default();
        let state = {
            let mut ctx = Ctx {
                sched: &mut sched,
                hw: &mut hw,
                out: &mut out,
            };
            SystemState::boot(timing, &mut ctx)
        };
        Self {
            sched,
            hw,
            out,
            state,
        }
    }

    /// Move the clock forward by `ms`, running every task at its own due
    /// time on the way.
    pub(crate) fn advance(&mut self, ms: u64) {
        let target = self.sched.now().after(ms);
        while let Some(deadline) = self.sched.next_deadline() {
            if !target.has_reached(deadline) {
                break;
            }
            self.sched.advance_to(deadline);
            self.run_due();
        }
        self.sched.advance_to(target);
        self.run_due();
    }

    /// Run `f` against the state with a live context, then run whatever it
    /// made due.
    pub(crate) fn with_ctx<F>(&mut self, f: F)
    where
        F: FnOnce(&mut SystemState, &mut Ctx<'_>),
    {
        {
            let mut ctx = Ctx {
                sched: &mut self.sched,
                hw: &mut self.hw,
                out: &mut self.out,
            };
            f(&mut self.state, &mut ctx);
        }
        self.run_due();
    }

    pub(crate) fn command(&mut self, cmd: Command) {
        self.with_ctx(|st, ctx| st.handle(cmd, ctx));
    }

    pub(crate) fn inbound(&mut self, topic: &str, payload: Payload) {
        self.with_ctx(|st, ctx| st.handle_message(topic, &payload, ctx));
    }

    /// Messages published on the `log` topic, oldest first.
    pub(crate) fn logs(&self) -> Vec<String> {
        self.out
            .messages
            .iter()
            .filter(|(t, _)| t == topics::LOG)
            .filter_map(|(_, p)| match p {
                Payload::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn log_count(&self, msg: &str) -> usize {
        self.logs().iter().filter(|l| *l == msg).count()
    }

    /// Pending fire of the shared fast-mode expiry task.
    pub(crate) fn expiry_due(&self) -> Option<Tick> {
        self.state
            .modes
            .expiry_task()
            .and_then(|id| self.sched.due(id))
    }

    fn run_due(&mut self) {
        node::run_due(&mut self.state, &mut self.sched, &mut self.hw, &mut self.out);
    }
}
