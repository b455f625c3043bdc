//! Raspberry Pi peripherals for the `hw` feature.
//!
//! - ADS1115 16-bit ADC over I2C for the soil, water and light probes.
//!   Single-ended reads at PGA ±4.096 V, 128 SPS, single-shot mode.
//! - TMP112 temperature sensor on the same bus.
//! - Pump relay and user button on GPIO.
//!
//! There is no battery gauge and no status LED on this board.

use std::{thread, time::Duration};

use anyhow::{ensure, Context, Result};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use tracing::{debug, error, info};

use crate::config::BoardSection;
use crate::drivers::{AdcChannel, Hardware};

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       start a single-shot conversion (write) / ready (read)
//   [14:12] MUX      input multiplexer
//   [11:9]  PGA      programmable gain amplifier
//   [8]     MODE     0 = continuous, 1 = single-shot
//   [7:5]   DR       data rate
//   [4:2]   comparator mode, polarity, latch
//   [1:0]   COMP_QUE 11 = comparator off

/// OS=1, PGA=001 (±4.096 V), MODE=1, DR=100 (128 SPS), COMP_QUE=11.
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// Single-ended MUX values, AIN0..AIN3 against GND.
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

const OS_READY_BIT: u16 = 1 << 15;

/// Conversion takes ~7.8 ms at 128 SPS.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Full-scale input at PGA ±4.096 V.
const FULL_SCALE_V: f32 = 4.096;

// ── TMP112 ──────────────────────────────────────────────────────────────────

const TMP112_REG_TEMP: u8 = 0x00;
const TMP112_C_PER_LSB: f32 = 0.0625;

fn config_for_channel(channel: u8) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[usize::from(channel)] << MUX_SHIFT)
}

/// Convert a single-ended conversion result to volts.  Negative codes only
/// come from bus noise and read as 0 V.
fn raw_to_volts(raw: i16) -> f32 {
    f32::from(raw.max(0)) * FULL_SCALE_V / 32_768.0
}

/// TMP112 temperature register: 12-bit two's complement, left-justified.
fn tmp112_to_celsius(bytes: [u8; 2]) -> f32 {
    let raw = i16::from_be_bytes(bytes) >> 4;
    f32::from(raw) * TMP112_C_PER_LSB
}

/// GPIO level that closes the relay.
fn relay_level_high(closed: bool, active_low: bool) -> bool {
    closed != active_low
}

// ── Driver ──────────────────────────────────────────────────────────────────

pub struct Board {
    adc: I2c,
    thermometer: I2c,
    relay: OutputPin,
    relay_active_low: bool,
    button: InputPin,
    soil_channel: u8,
    water_channel: u8,
    light_channel: u8,
}

impl Board {
    /// Open I2C bus 1 and the GPIO pins from `cfg`.  The relay is driven
    /// open before anything else happens.
    pub fn new(cfg: &BoardSection) -> Result<Self> {
        for ch in [cfg.soil_channel, cfg.water_channel, cfg.light_channel] {
            ensure!(
                usize::from(ch) < MUX_SINGLE_ENDED.len(),
                "ADS1115 channel {ch} out of range"
            );
        }

        let gpio = Gpio::new().context("failed to open gpio")?;
        let mut relay = gpio
            .get(cfg.relay_gpio)
            .with_context(|| format!("relay gpio {}", cfg.relay_gpio))?
            .into_output();
        if relay_level_high(false, cfg.relay_active_low) {
            relay.set_high();
        } else {
            relay.set_low();
        }
        let button = gpio
            .get(cfg.button_gpio)
            .with_context(|| format!("button gpio {}", cfg.button_gpio))?
            .into_input_pulldown();

        let mut adc = I2c::new().context("failed to open i2c bus")?;
        adc.set_slave_address(cfg.ads1115_addr)?;
        let mut thermometer = I2c::new().context("failed to open i2c bus")?;
        thermometer.set_slave_address(cfg.tmp112_addr)?;

        info!(
            ads1115 = format_args!("0x{:02x}", cfg.ads1115_addr),
            tmp112 = format_args!("0x{:02x}", cfg.tmp112_addr),
            relay_gpio = cfg.relay_gpio,
            button_gpio = cfg.button_gpio,
            "board initialised"
        );

        Ok(Self {
            adc,
            thermometer,
            relay,
            relay_active_low: cfg.relay_active_low,
            button,
            soil_channel: cfg.soil_channel,
            water_channel: cfg.water_channel,
            light_channel: cfg.light_channel,
        })
    }

    fn channel(&self, channel: AdcChannel) -> u8 {
        match channel {
            AdcChannel::Soil => self.soil_channel,
            AdcChannel::Water => self.water_channel,
            AdcChannel::Light => self.light_channel,
        }
    }

    /// Single-shot read of ADS1115 input `channel`.
    fn read_raw(&mut self, channel: u8) -> Result<i16> {
        self.adc
            .block_write(REG_CONFIG, &config_for_channel(channel).to_be_bytes())?;
        thread::sleep(CONVERSION_WAIT);

        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.adc.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.adc.block_read(REG_CONVERSION, &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl Hardware for Board {
    fn measure(&mut self, channel: AdcChannel) -> Option<f32> {
        let input = self.channel(channel);
        match self.read_raw(input) {
            Ok(raw) => Some(raw_to_volts(raw)),
            Err(e) => {
                error!(%channel, input, "adc read failed: {e}");
                None
            }
        }
    }

    fn set_relay(&mut self, closed: bool) {
        if relay_level_high(closed, self.relay_active_low) {
            self.relay.set_high();
        } else {
            self.relay.set_low();
        }
        debug!(closed, "relay");
    }

    fn temperature_c(&mut self) -> Option<f32> {
        let mut buf = [0u8; 2];
        match self.thermometer.block_read(TMP112_REG_TEMP, &mut buf) {
            Ok(()) => Some(tmp112_to_celsius(buf)),
            Err(e) => {
                error!("tmp112 read failed: {e}");
                None
            }
        }
    }

    fn battery_percent(&mut self) -> Option<u8> {
        None
    }

    fn pulse_led(&mut self, ms: u64) {
        debug!(ms, "led pulse (no led wired)");
    }

    fn button_pressed(&mut self) -> Option<bool> {
        Some(self.button.is_high())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
