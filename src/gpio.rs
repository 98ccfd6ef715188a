//! Pin capability consumed by the driver.
//!
//! The driver never touches pad registers itself. A platform
//! integration implements [`SerialPin`] once for its GPIO type and
//! the driver reconfigures the line through it: input with a pull for
//! receive, driven output for transmit, floating input when a
//! half-duplex direction is parked.

use embedded_hal::digital::PinState;

/// Digital input or output level.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Low
    Low,
    /// High
    High,
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        match val {
            true => Self::High,
            false => Self::Low,
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        match level {
            Level::Low => false,
            Level::High => true,
        }
    }
}

impl From<PinState> for Level {
    fn from(state: PinState) -> Self {
        match state {
            PinState::Low => Self::Low,
            PinState::High => Self::High,
        }
    }
}

impl From<Level> for PinState {
    fn from(level: Level) -> PinState {
        match level {
            Level::Low => PinState::Low,
            Level::High => PinState::High,
        }
    }
}

/// Pull setting for an input.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// No pull
    None,
    /// Pull up
    Up,
    /// Pull down
    Down,
}

/// A reconfigurable line the soft UART receives or transmits on.
///
/// Half-duplex ports flip one pin between all three shapes at
/// runtime; full-duplex ports configure each pin once at open.
pub trait SerialPin {
    /// Put the pin into input mode with the given pull.
    fn set_as_input(&mut self, pull: Pull);

    /// Put the pin into push-pull output mode, driving `initial`.
    fn set_as_output(&mut self, initial: Level);

    /// Set the output level. Only meaningful in output mode.
    fn set_level(&mut self, level: Level);
}
