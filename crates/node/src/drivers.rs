//! Peripheral contract used by the control core.  The `sim` feature provides
//! a simulated plant ([`crate::sim`]), the `hw` feature the Raspberry Pi
//! board ([`crate::board`]).

use std::fmt;

/// Analog inputs sampled through the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdcChannel {
    Soil,
    Water,
    Light,
}

impl fmt::Display for AdcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soil => write!(f, "soil"),
            Self::Water => write!(f, "water"),
            Self::Light => write!(f, "light"),
        }
    }
}

pub trait Hardware {
    /// One-shot measurement on `channel`, in volts.  `None` when the read
    /// failed.
    fn measure(&mut self, channel: AdcChannel) -> Option<f32>;

    /// Drive the pump relay.  `closed` means the pump is running.
    fn set_relay(&mut self, closed: bool);

    fn temperature_c(&mut self) -> Option<f32>;

    /// Battery charge level in percent.  `None` when there is no gauge or
    /// the read failed.
    fn battery_percent(&mut self) -> Option<u8>;

    fn pulse_led(&mut self, ms: u64);

    /// Raw button level (`true` = pressed), `None` when no button is wired.
    fn button_pressed(&mut self) -> Option<bool> {
        None
    }
}
