//! TOML config file loading, environment overrides and validation.
//!
//! Every key has a default, so the node also runs without a config file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeSection,
    pub mqtt: MqttSection,
    pub timing: Timing,
    pub sim: SimSection,
    pub board: BoardSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub id: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: "smart-pot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    pub keep_alive_s: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_s: 30,
        }
    }
}

/// Task intervals and durations, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub temp_interval_ms: u64,
    pub soil_interval_ms: u64,
    pub light_interval_ms: u64,
    pub water_interval_ms: u64,
    pub battery_interval_ms: u64,
    /// Pump on-time, and the rest time between on-times in a cycle.
    pub pump_on_time_ms: u64,
    /// Cadence of the soil/water samples during a watering session.
    pub fast_interval_ms: u64,
    pub fast_mode_duration_ms: u64,
    /// First value logged by the pump countdown, one step per second.
    pub countdown_start: u32,
    pub button_hold_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            temp_interval_ms: 30_000,
            soil_interval_ms: 30_000,
            light_interval_ms: 30_000,
            water_interval_ms: 30_000,
            battery_interval_ms: 60 * 60 * 1_000,
            pump_on_time_ms: 5_000,
            fast_interval_ms: 5_000,
            fast_mode_duration_ms: 120_000,
            countdown_start: 5,
            button_hold_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimSection {
    /// drying | stable | flaky | low-water
    pub scenario: String,
    /// Length of a simulated day.  600 gives a quick day/night swing.
    pub diurnal_period_s: f64,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            scenario: "drying".to_string(),
            diurnal_period_s: 600.0,
        }
    }
}

/// Raspberry Pi wiring, only read with the `hw` feature.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardSection {
    pub relay_gpio: u8,
    /// Many relay boards are active-low.
    pub relay_active_low: bool,
    pub button_gpio: u8,
    pub ads1115_addr: u16,
    pub tmp112_addr: u16,
    pub soil_channel: u8,
    pub water_channel: u8,
    pub light_channel: u8,
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            relay_gpio: 17,
            relay_active_low: true,
            button_gpio: 27,
            ads1115_addr: 0x48,
            tmp112_addr: 0x49,
            soil_channel: 0,
            water_channel: 1,
            light_channel: 2,
        }
    }
}

/// Characters with special meaning in MQTT topics.
const TOPIC_RESERVED: &[char] = &['/', '+', '#'];

/// Longest accepted interval or duration.  Deadlines are compared by signed
/// distance on the wrapping tick, so a step must stay far below `i64::MAX`.
const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Highest single-ended ADS1115 input.
const ADS1115_MAX_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all sections.  Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_node(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_board(&mut errors);

        if !(self.sim.diurnal_period_s > 0.0) {
            errors.push("sim.diurnal_period_s must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_node(&self, errors: &mut Vec<String>) {
        let id = self.node.id.trim();
        if id.is_empty() {
            errors.push("node.id is empty".to_string());
        } else if id.contains(TOPIC_RESERVED) {
            errors.push(format!(
                "node.id '{}' must not contain '/', '+' or '#'",
                self.node.id
            ));
        }

        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt.host is empty".to_string());
        }
        if self.mqtt.port == 0 {
            errors.push("mqtt.port must be non-zero".to_string());
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;

        // ── All intervals positive and bounded ──────────────
        let intervals = [
            ("temp_interval_ms", t.temp_interval_ms),
            ("soil_interval_ms", t.soil_interval_ms),
            ("light_interval_ms", t.light_interval_ms),
            ("water_interval_ms", t.water_interval_ms),
            ("battery_interval_ms", t.battery_interval_ms),
            ("pump_on_time_ms", t.pump_on_time_ms),
            ("fast_interval_ms", t.fast_interval_ms),
            ("fast_mode_duration_ms", t.fast_mode_duration_ms),
            ("button_hold_ms", t.button_hold_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                errors.push(format!("timing.{name} must be positive"));
            } else if value > MAX_INTERVAL_MS {
                errors.push(format!(
                    "timing.{name} ({value}) exceeds the {MAX_INTERVAL_MS} ms limit (7 days)"
                ));
            }
        }

        // ── Cadence relationships ───────────────────────────
        if t.fast_interval_ms > 0 {
            if t.fast_interval_ms >= t.soil_interval_ms {
                errors.push(format!(
                    "timing.fast_interval_ms ({}) must be shorter than soil_interval_ms ({})",
                    t.fast_interval_ms, t.soil_interval_ms
                ));
            }
            if t.fast_interval_ms >= t.water_interval_ms {
                errors.push(format!(
                    "timing.fast_interval_ms ({}) must be shorter than water_interval_ms ({})",
                    t.fast_interval_ms, t.water_interval_ms
                ));
            }
            if t.fast_mode_duration_ms < t.fast_interval_ms {
                errors.push(format!(
                    "timing.fast_mode_duration_ms ({}) is shorter than fast_interval_ms ({})",
                    t.fast_mode_duration_ms, t.fast_interval_ms
                ));
            }
        }

        // ── Countdown fits in one on-time ───────────────────
        if t.countdown_start == 0 {
            errors.push("timing.countdown_start must be positive".to_string());
        } else if u64::from(t.countdown_start) * 1_000 > t.pump_on_time_ms {
            errors.push(format!(
                "timing.countdown_start ({}s) outlives pump_on_time_ms ({})",
                t.countdown_start, t.pump_on_time_ms
            ));
        }
    }

    fn validate_board(&self, errors: &mut Vec<String>) {
        let b = &self.board;
        let channels = [
            ("soil_channel", b.soil_channel),
            ("water_channel", b.water_channel),
            ("light_channel", b.light_channel),
        ];
        for (name, ch) in channels {
            if ch > ADS1115_MAX_CHANNEL {
                errors.push(format!(
                    "board.{name} {ch} out of range (0-{ADS1115_MAX_CHANNEL})"
                ));
            }
        }
        if b.soil_channel == b.water_channel
            || b.soil_channel == b.light_channel
            || b.water_channel == b.light_channel
        {
            errors.push("board: soil, water and light must use distinct ADC channels".to_string());
        }
        if b.relay_gpio == b.button_gpio {
            errors.push(format!(
                "board: relay_gpio and button_gpio are both {}",
                b.relay_gpio
            ));
        }
    }

    /// Apply `MQTT_HOST`, `MQTT_PORT`, `NODE_ID` and `SIM_SCENARIO`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = env::var("MQTT_PORT") {
            self.mqtt.port = port
                .parse()
                .with_context(|| format!("invalid MQTT_PORT: {port:?}"))?;
        }
        if let Ok(id) = env::var("NODE_ID") {
            self.node.id = id;
        }
        if let Ok(scenario) = env::var("SIM_SCENARIO") {
            self.sim.scenario = scenario;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    Ok(config)
}

/// Read the TOML file at `path` (defaults when `None`), apply environment
/// overrides and validate the result.
pub fn load(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {path}"))?;
            parse(&contents).with_context(|| format!("in {path}"))?
        }
        None => Config::default(),
    };
    config.apply_env()?;
    config.validate().context("invalid config")?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn error_text(cfg: &Config) -> String {
        format!("{:#}", cfg.validate().unwrap_err())
    }

    // -- Defaults ----------------------------------------------------------------

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_timing_matches_firmware() {
        let t = Timing::default();
        assert_eq!(t.pump_on_time_ms, 5_000);
        assert_eq!(t.fast_interval_ms, 5_000);
        assert_eq!(t.fast_mode_duration_ms, 120_000);
        assert_eq!(t.battery_interval_ms, 3_600_000);
        assert_eq!(t.countdown_start, 5);
    }

    // -- Parsing -----------------------------------------------------------------

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.timing, Timing::default());
        assert_eq!(cfg.node.id, "smart-pot");
        assert_eq!(cfg.mqtt.port, 1883);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [node]
            id = "balcony"

            [timing]
            fast_interval_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.node.id, "balcony");
        assert_eq!(cfg.timing.fast_interval_ms, 2_000);
        assert_eq!(cfg.timing.soil_interval_ms, 30_000);
        assert_eq!(cfg.mqtt.host, "127.0.0.1");
    }

    #[test]
    fn bad_type_fails_to_parse() {
        assert!(parse("[timing]\npump_on_time_ms = \"five\"").is_err());
    }

    // -- Validation --------------------------------------------------------------

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = Config::default();
        cfg.timing.light_interval_ms = 0;
        assert!(error_text(&cfg).contains("timing.light_interval_ms must be positive"));
    }

    #[test]
    fn huge_interval_rejected() {
        let mut cfg = Config::default();
        cfg.timing.battery_interval_ms = u64::MAX;
        assert!(error_text(&cfg).contains("timing.battery_interval_ms"));

        let mut cfg = Config::default();
        cfg.timing.fast_mode_duration_ms = i64::MAX as u64 + 1;
        assert!(error_text(&cfg).contains("exceeds"));
    }

    #[test]
    fn week_long_interval_accepted() {
        let mut cfg = Config::default();
        cfg.timing.battery_interval_ms = MAX_INTERVAL_MS;
        cfg.validate().unwrap();
    }

    #[test]
    fn fast_interval_must_be_shorter_than_normal() {
        let mut cfg = Config::default();
        cfg.timing.fast_interval_ms = 30_000;
        let text = error_text(&cfg);
        assert!(text.contains("shorter than soil_interval_ms"));
        assert!(text.contains("shorter than water_interval_ms"));
    }

    #[test]
    fn fast_duration_shorter_than_interval_rejected() {
        let mut cfg = Config::default();
        cfg.timing.fast_mode_duration_ms = 1_000;
        assert!(error_text(&cfg).contains("fast_mode_duration_ms"));
    }

    #[test]
    fn countdown_longer_than_on_time_rejected() {
        let mut cfg = Config::default();
        cfg.timing.countdown_start = 6;
        assert!(error_text(&cfg).contains("outlives pump_on_time_ms"));
    }

    #[test]
    fn zero_countdown_rejected() {
        let mut cfg = Config::default();
        cfg.timing.countdown_start = 0;
        assert!(error_text(&cfg).contains("countdown_start must be positive"));
    }

    #[test]
    fn node_id_with_wildcard_rejected() {
        let mut cfg = Config::default();
        cfg.node.id = "pot/+".into();
        assert!(error_text(&cfg).contains("must not contain"));
    }

    #[test]
    fn empty_node_id_rejected() {
        let mut cfg = Config::default();
        cfg.node.id = "  ".into();
        assert!(error_text(&cfg).contains("node.id is empty"));
    }

    #[test]
    fn board_channel_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.board.light_channel = 4;
        assert!(error_text(&cfg).contains("board.light_channel 4 out of range"));
    }

    #[test]
    fn board_duplicate_channels_rejected() {
        let mut cfg = Config::default();
        cfg.board.water_channel = 0;
        assert!(error_text(&cfg).contains("distinct ADC channels"));
    }

    #[test]
    fn zero_diurnal_period_rejected() {
        let mut cfg = Config::default();
        cfg.sim.diurnal_period_s = 0.0;
        assert!(error_text(&cfg).contains("sim.diurnal_period_s"));
    }

    #[test]
    fn all_errors_reported_together() {
        let mut cfg = Config::default();
        cfg.node.id = String::new();
        cfg.mqtt.port = 0;
        cfg.timing.temp_interval_ms = 0;
        let text = error_text(&cfg);
        assert!(text.contains("3 errors"), "{text}");
    }
}
