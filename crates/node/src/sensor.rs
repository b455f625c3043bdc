//! Sensor sampling tasks and the voltage-to-unit conversions they publish.
//!
//! The soil and water channels have two tasks each: the normal task runs at
//! the slow cadence forever, the watering variant runs at the fast cadence
//! forever but only measures while its channel is in fast mode.  Neither
//! task ever changes the other's interval.

use std::fmt;

use tracing::{debug, warn};

use crate::drivers::AdcChannel;
use crate::mode::Channel;
use crate::node::{Ctx, SystemState};
use crate::pump::{self, Shutdown};
use crate::scheduler::Rearm;
use crate::telemetry::{topics, Payload};

/// Supply voltage of the analog sensors.
const VDD: f32 = 3.3;
/// Soil probe voltage in saturated soil.
const SOIL_WET_V: f32 = 1.0;

const WATER_LOW_MAX_V: f32 = 1.5;
const WATER_MEDIUM_MAX_V: f32 = 1.7;

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn clamp_percent(p: f32) -> f32 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 100.0)
    }
}

/// Soil humidity in percent: 1.0 V reads 100 %, 3.3 V reads 0 %.
pub(crate) fn soil_percent(volts: f32) -> f32 {
    clamp_percent((1.0 - (volts - SOIL_WET_V) / (VDD - SOIL_WET_V)) * 100.0)
}

/// Ambient light in percent: 0 V is full light, 3.3 V is dark.
pub(crate) fn light_percent(volts: f32) -> f32 {
    clamp_percent((1.0 - volts / VDD) * 100.0)
}

/// Reservoir level class.  The pump interlock and the published status both
/// come from this one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaterLevel {
    Low,
    Medium,
    High,
}

impl WaterLevel {
    /// A reading that is not a number classifies as `Low`, which keeps the
    /// pump locked out.
    pub(crate) fn classify(volts: f32) -> Self {
        if volts.is_nan() || volts <= WATER_LOW_MAX_V {
            Self::Low
        } else if volts <= WATER_MEDIUM_MAX_V {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Latest readings
// ---------------------------------------------------------------------------

/// Retained between samples.  Only the reservoir reading outlives its task:
/// the interlock needs it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Readings {
    /// Interlock input.  Starts at 0 V, so the pump stays locked until the
    /// first water reading arrives.
    pub(crate) water_volts: f32,
}

impl Readings {
    pub(crate) fn water_level(&self) -> WaterLevel {
        WaterLevel::classify(self.water_volts)
    }
}

fn measure(ctx: &mut Ctx<'_>, channel: AdcChannel) -> Option<f32> {
    let volts = ctx.hw.measure(channel);
    if volts.is_none() {
        warn!(%channel, "adc read failed, skipping this sample");
    }
    volts
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

pub(crate) fn temperature_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    match ctx.hw.temperature_c() {
        Some(t) => ctx.publish(topics::TEMP, Payload::Float(t)),
        None => warn!("temperature read failed"),
    }
    Rearm::After(st.timing.temp_interval_ms)
}

pub(crate) fn battery_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if let Some(percent) = ctx.hw.battery_percent() {
        ctx.publish(topics::BATTERY, Payload::Float(f32::from(percent)));
    }
    Rearm::After(st.timing.battery_interval_ms)
}

pub(crate) fn light_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if let Some(volts) = measure(ctx, AdcChannel::Light) {
        ctx.publish(topics::LIGHT, Payload::Float(light_percent(volts)));
    }
    Rearm::After(st.timing.light_interval_ms)
}

pub(crate) fn soil_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    sample_soil(ctx, topics::SOIL);
    Rearm::After(st.timing.soil_interval_ms)
}

pub(crate) fn water_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    sample_water(st, ctx, topics::WATER);
    Rearm::After(st.timing.water_interval_ms)
}

/// Fast soil variant: measures only while soil is in fast mode, but always
/// comes back at the fast interval to look at the flag again.
pub(crate) fn watering_soil_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if st.modes.mode(Channel::Soil).is_fast() {
        sample_soil(ctx, topics::SOIL_WATERING);
    } else {
        debug!("soil in normal mode, fast sample skipped");
    }
    Rearm::After(st.timing.fast_interval_ms)
}

pub(crate) fn watering_water_task(st: &mut SystemState, ctx: &mut Ctx<'_>) -> Rearm {
    if st.modes.mode(Channel::Water).is_fast() {
        sample_water(st, ctx, topics::WATER_WATERING);
    } else {
        debug!("water in normal mode, fast sample skipped");
    }
    Rearm::After(st.timing.fast_interval_ms)
}

fn sample_soil(ctx: &mut Ctx<'_>, topic: &str) {
    let Some(volts) = measure(ctx, AdcChannel::Soil) else {
        return;
    };
    ctx.publish(topic, Payload::Float(soil_percent(volts)));
}

/// Classify the reservoir, publish the status and trip the interlock when
/// the pump is running on a low reservoir.
fn sample_water(st: &mut SystemState, ctx: &mut Ctx<'_>, topic: &str) {
    let Some(volts) = measure(ctx, AdcChannel::Water) else {
        return;
    };
    st.readings.water_volts = volts;
    let level = st.readings.water_level();
    ctx.publish(topic, Payload::Text(level.to_string()));

    if level == WaterLevel::Low && st.pump.state().is_on() {
        pump::shutdown(st, Shutdown::LowWater, ctx);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
