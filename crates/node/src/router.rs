//! Maps inbound remote commands and local button events onto the pump and
//! the mode controller.

use tracing::{debug, info};

use crate::mode;
use crate::node::{Ctx, SystemState};
use crate::pump::{self, ActivationSource, Shutdown};
use crate::telemetry::{topics, Payload};

const LED_PULSE_MS: u64 = 1_000;
const PAIRING_NAME: &str = "smart_pot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// `pump/-/set/state`
    PumpSetState(bool),
    /// `watering/-/set/state`
    WateringSetState(bool),
    ButtonClick,
    /// Button held past the hold threshold.
    ButtonHold,
}

impl Command {
    /// Parse a message received on one of the subscribed radio topics.
    pub(crate) fn from_message(topic: &str, payload: &Payload) -> Result<Self, String> {
        let ctor: fn(bool) -> Command = match topic {
            topics::PUMP_SET_STATE => Command::PumpSetState,
            topics::WATERING_SET_STATE => Command::WateringSetState,
            _ => return Err(format!("unhandled topic '{topic}'")),
        };
        parse_state(payload).map(ctor)
    }
}

/// Parse a `0`/`1` state payload.
pub(crate) fn parse_state(payload: &Payload) -> Result<bool, String> {
    match payload {
        Payload::Int(1) => Ok(true),
        Payload::Int(0) => Ok(false),
        other => Err(format!("invalid state payload {other:?} (use 0/1)")),
    }
}

pub(crate) fn dispatch(st: &mut SystemState, cmd: Command, ctx: &mut Ctx<'_>) {
    debug!(?cmd, "dispatch");
    match cmd {
        Command::PumpSetState(true) => {
            let _ = pump::activate(st, ActivationSource::RemoteCommand, ctx);
        }
        Command::PumpSetState(false) => pump::shutdown(st, Shutdown::Remote, ctx),
        Command::WateringSetState(true) => {
            mode::enter_fast(st, ctx);
            ctx.log("Watering mode ON (fast sensor updates)");
        }
        Command::WateringSetState(false) => {
            mode::exit_fast(st, ctx);
            ctx.log("Watering mode OFF");
        }
        Command::ButtonClick => {
            if st.pump.state().is_on() {
                debug!("button click ignored, pump already on");
                return;
            }
            let _ = pump::activate(st, ActivationSource::Button, ctx);
        }
        Command::ButtonHold => {
            let request = format!("{PAIRING_NAME} {}", env!("CARGO_PKG_VERSION"));
            info!(%request, "pairing request");
            ctx.publish(topics::PAIRING, Payload::Text(request));
            ctx.log("Pairing request sent (via button)");
            ctx.hw.pulse_led(LED_PULSE_MS);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
