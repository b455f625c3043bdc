//! Turns a sampled button level into click / hold events.
//!
//! A hold fires once, while the button is still down, as soon as it has
//! been pressed for the hold time.  Releasing after a hold produces nothing;
//! releasing before it produces a click.

use crate::clock::Tick;
use crate::router::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ButtonEvent {
    Click,
    Hold,
}

impl From<ButtonEvent> for Command {
    fn from(event: ButtonEvent) -> Self {
        match event {
            ButtonEvent::Click => Command::ButtonClick,
            ButtonEvent::Hold => Command::ButtonHold,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Button {
    hold_ms: u64,
    pressed_since: Option<Tick>,
    hold_fired: bool,
}

impl Button {
    pub(crate) fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            pressed_since: None,
            hold_fired: false,
        }
    }

    /// Feed the current level.  Call at a steady poll rate.
    pub(crate) fn update(&mut self, pressed: bool, now: Tick) -> Option<ButtonEvent> {
        match (pressed, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now);
                self.hold_fired = false;
                None
            }
            (true, Some(since)) => {
                if !self.hold_fired && now.has_reached(since.after(self.hold_ms)) {
                    self.hold_fired = true;
                    Some(ButtonEvent::Hold)
                } else {
                    None
                }
            }
            (false, Some(_)) => {
                self.pressed_since = None;
                (!self.hold_fired).then_some(ButtonEvent::Click)
            }
            (false, None) => None,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
