//! Stateful plant simulator for running the node without hardware.
//!
//! Models:
//! - Soil probe voltage as a random walk with mean reversion and drying drift
//! - Wetting response while the pump relay is closed
//! - A reservoir that drains in proportion to pump run time
//! - Diurnal (day/night) light and temperature
//! - ADC noise, occasional spikes and failed reads
//! - A slowly discharging battery

use std::fmt;
use std::time::Instant;

use tracing::{debug, info};

use crate::drivers::{AdcChannel, Hardware};

/// Probe voltage range: 1.0 V in saturated soil, 3.3 V bone dry.
const SOIL_WET_V: f64 = 1.0;
const SOIL_DRY_V: f64 = 3.3;

/// Reservoir sensor voltage when the tank is full.
const RESERVOIR_FULL_V: f64 = 2.2;
const RESERVOIR_EMPTY_V: f64 = 1.0;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` or
/// `[sim] scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Soil starts mid-range and dries steadily.  Full reservoir.
    Drying,
    /// Soil hovers near the centre with low noise.
    Stable,
    /// High noise, frequent spikes and the odd failed read.
    Flaky,
    /// Reservoir just above the medium threshold: a few pump runs drain it
    /// into the interlock.
    LowWater,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "low-water" | "low_water" | "lowwater" => Self::LowWater,
            _ => Self::Drying,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::LowWater => write!(f, "low-water"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct PlantSim {
    // Soil probe
    soil_base: f64,
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    center: f64,
    noise_sigma: f64,
    wet_per_sample: f64,

    // Flakiness
    spike_prob: f32,
    spike_sigma: f64,
    fail_prob: f32,

    // Reservoir
    reservoir: f64,
    drain_per_sec: f64,

    // Pump
    relay_closed: bool,
    pump_since: Option<Instant>,

    battery: f64,
    diurnal_period_s: f64,
    started: Instant,
}

impl PlantSim {
    /// `diurnal_period_s` controls the day/night cycle length.  Use 600
    /// (10 min) for fast dev iteration or 86400 for real time.
    pub fn new(scenario: Scenario, diurnal_period_s: f64) -> Self {
        let (drift, walk_sigma, mean_rev, noise, spike_prob, spike_sigma, fail_prob, reservoir) =
            match scenario {
                Scenario::Drying => (0.004, 0.02, 0.02, 0.01, 0.02_f32, 0.3, 0.0_f32, RESERVOIR_FULL_V),
                Scenario::Stable => (0.0005, 0.008, 0.05, 0.005, 0.005, 0.15, 0.0, RESERVOIR_FULL_V),
                Scenario::Flaky => (0.003, 0.04, 0.02, 0.03, 0.10, 0.5, 0.02, RESERVOIR_FULL_V),
                Scenario::LowWater => (0.004, 0.02, 0.02, 0.01, 0.02, 0.3, 0.0, 1.75),
            };

        let center = (SOIL_WET_V + SOIL_DRY_V) / 2.0;
        info!(%scenario, "plant simulator ready");

        Self {
            soil_base: (center + gaussian(0.0, 0.05)).clamp(SOIL_WET_V, SOIL_DRY_V),
            drift_per_sample: drift,
            walk_sigma,
            mean_reversion: mean_rev,
            center,
            noise_sigma: noise,
            wet_per_sample: -0.08,
            spike_prob,
            spike_sigma,
            fail_prob,
            reservoir,
            drain_per_sec: 0.01,
            relay_closed: false,
            pump_since: None,
            battery: 100.0,
            diurnal_period_s,
            started: Instant::now(),
        }
    }

    /// Sine of the day phase: +1 at "noon", -1 at "midnight".
    fn daylight(&self) -> f64 {
        let t = self.started.elapsed().as_secs_f64();
        (2.0 * std::f64::consts::PI * t / self.diurnal_period_s).sin()
    }

    fn sample_soil(&mut self) -> f64 {
        let pull = self.mean_reversion * (self.center - self.soil_base);
        let walk = gaussian(0.0, self.walk_sigma);
        let wet = if self.relay_closed { self.wet_per_sample } else { 0.0 };

        self.soil_base = (self.soil_base + self.drift_per_sample + pull + walk + wet)
            .clamp(SOIL_WET_V - 0.2, SOIL_DRY_V + 0.2);

        let noise = gaussian(0.0, self.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };
        self.soil_base + noise + spike
    }

    /// Reservoir voltage including the drain of a pump run in progress.
    fn sample_reservoir(&self) -> f64 {
        let running = self
            .pump_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let level = self.reservoir - running * self.drain_per_sec;
        level.max(RESERVOIR_EMPTY_V) + gaussian(0.0, 0.005)
    }

    fn sample_light(&self) -> f64 {
        let v = 3.3 * (0.5 - 0.45 * self.daylight()) + gaussian(0.0, 0.02);
        v.clamp(0.0, 3.3)
    }

    /// Account for `secs` of pumping.
    fn drain(&mut self, secs: f64) {
        self.reservoir = (self.reservoir - secs * self.drain_per_sec).max(RESERVOIR_EMPTY_V);
    }
}

impl Hardware for PlantSim {
    fn measure(&mut self, channel: AdcChannel) -> Option<f32> {
        if fastrand::f32() < self.fail_prob {
            debug!(%channel, "[sim] adc read failed");
            return None;
        }
        let volts = match channel {
            AdcChannel::Soil => self.sample_soil(),
            AdcChannel::Water => self.sample_reservoir(),
            AdcChannel::Light => self.sample_light(),
        };
        self.battery = (self.battery - 0.001).max(0.0);
        Some(volts.clamp(0.0, 3.3) as f32)
    }

    fn set_relay(&mut self, closed: bool) {
        if closed && self.pump_since.is_none() {
            self.pump_since = Some(Instant::now());
        }
        if !closed {
            if let Some(since) = self.pump_since.take() {
                self.drain(since.elapsed().as_secs_f64());
            }
        }
        self.relay_closed = closed;
        debug!(closed, reservoir = format!("{:.3}", self.reservoir), "[sim] relay");
    }

    fn temperature_c(&mut self) -> Option<f32> {
        let t = 21.0 + 4.0 * self.daylight() + gaussian(0.0, 0.1);
        Some(t as f32)
    }

    fn battery_percent(&mut self) -> Option<u8> {
        Some(self.battery.round().clamp(0.0, 100.0) as u8)
    }

    fn pulse_led(&mut self, ms: u64) {
        debug!(ms, "[sim] led pulse");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{soil_percent, WaterLevel};

    fn collect_soil(sim: &mut PlantSim, n: usize) -> Vec<f32> {
        (0..n).filter_map(|_| sim.measure(AdcChannel::Soil)).collect()
    }

    #[test]
    fn readings_within_adc_range() {
        let mut sim = PlantSim::new(Scenario::Flaky, 600.0);
        for _ in 0..500 {
            for ch in [AdcChannel::Soil, AdcChannel::Water, AdcChannel::Light] {
                if let Some(v) = sim.measure(ch) {
                    assert!((0.0..=3.3).contains(&v), "{ch} out of range: {v}");
                }
            }
        }
    }

    #[test]
    fn temporal_coherence() {
        let mut sim = PlantSim::new(Scenario::Stable, 600.0);
        let samples = collect_soil(&mut sim, 100);
        let max_jump = samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0_f32, f32::max);
        // Stable soil should never jump across most of the 2.3 V span.
        assert!(max_jump < 1.0, "max consecutive jump too large: {max_jump}");
    }

    #[test]
    fn watering_makes_soil_wetter() {
        let mut sim = PlantSim::new(Scenario::Drying, 600.0);
        for _ in 0..20 {
            sim.measure(AdcChannel::Soil);
        }
        let before = collect_soil(&mut sim, 20).iter().map(|&v| soil_percent(v)).sum::<f32>() / 20.0;

        sim.relay_closed = true;
        for _ in 0..30 {
            sim.measure(AdcChannel::Soil);
        }
        let after = collect_soil(&mut sim, 20).iter().map(|&v| soil_percent(v)).sum::<f32>() / 20.0;

        assert!(
            after > before,
            "watering should raise humidity: before={before:.1}% after={after:.1}%"
        );
    }

    #[test]
    fn full_reservoir_reads_high() {
        let mut sim = PlantSim::new(Scenario::Drying, 600.0);
        let v = sim.measure(AdcChannel::Water).unwrap();
        assert_eq!(WaterLevel::classify(v), WaterLevel::High);
    }

    #[test]
    fn low_water_scenario_drains_into_interlock() {
        let mut sim = PlantSim::new(Scenario::LowWater, 600.0);
        let v = sim.measure(AdcChannel::Water).unwrap();
        assert_eq!(WaterLevel::classify(v), WaterLevel::High);

        // Ten 5 s pump runs.
        for _ in 0..10 {
            sim.drain(5.0);
        }
        let v = sim.measure(AdcChannel::Water).unwrap();
        assert_eq!(WaterLevel::classify(v), WaterLevel::Low);
    }

    #[test]
    fn reservoir_never_drops_below_empty() {
        let mut sim = PlantSim::new(Scenario::Drying, 600.0);
        sim.drain(1_000_000.0);
        assert_eq!(sim.reservoir, RESERVOIR_EMPTY_V);
    }

    #[test]
    fn relay_open_without_close_does_not_drain() {
        let mut sim = PlantSim::new(Scenario::Drying, 600.0);
        sim.set_relay(false);
        assert_eq!(sim.reservoir, RESERVOIR_FULL_V);
    }

    #[test]
    fn battery_in_percent_range() {
        let mut sim = PlantSim::new(Scenario::Drying, 600.0);
        let p = sim.battery_percent().unwrap();
        assert!(p <= 100);
    }

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("drying"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy("STABLE"), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy("Flaky"), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("low-water"), Scenario::LowWater);
        assert_eq!(Scenario::from_str_lossy("low_water"), Scenario::LowWater);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy(""), Scenario::Drying);
    }

    #[test]
    fn scenario_display_round_trips() {
        for s in [Scenario::Drying, Scenario::Stable, Scenario::Flaky, Scenario::LowWater] {
            assert_eq!(Scenario::from_str_lossy(&s.to_string()), s);
        }
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let n = 5000;
        let sum: f64 = (0..n).map(|_| approx_std_normal()).sum();
        let mean = sum / n as f64;
        assert!(
            mean.abs() < 0.15,
            "approx_std_normal mean should be near zero: {mean}"
        );
    }
}
