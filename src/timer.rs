//! Timer capability and bit-timebase configuration.
//!
//! The driver needs exactly one timer feature set: a free-running
//! counter whose overflow period is one bit duration (the bit clock),
//! plus edge capture on the RX line with selectable polarity. A
//! platform integration implements [`CaptureTimer`] for its timer
//! channel type and wires the capture and overflow interrupts to the
//! port's `on_capture` / `on_overflow` entry points.

use crate::time::Hertz;

/// Input-capture edge polarity.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    Rising,
    Falling,
}

/// Config Error
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Baudrate too low: the bit period does not fit the counter even
    /// at the largest supported prescaler.
    BaudrateTooLow,
    /// Baudrate too high: the bit period is below one counter tick.
    BaudrateTooHigh,
}

/// Largest clock-halving step the timebase search will try. 2^16 is
/// the prescaler range of the 16-bit timers this driver is built for.
const MAX_PRESCALER_SHIFT: u8 = 16;

/// A programmed bit-clock timebase: counter period in ticks of the
/// prescaled clock, and the power-of-two prescaler as a shift count.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timebase {
    /// Overflow period, in prescaled ticks. One bit duration.
    pub period: u32,
    /// Prescaler exponent: effective clock = `clock >> prescaler_shift`.
    pub prescaler_shift: u8,
}

impl Timebase {
    /// Derive the timebase for `baud` from the counter input clock.
    ///
    /// `period = clock / baud`; while the period exceeds the
    /// counter's range the effective clock is halved (prescaler
    /// doubled) and the period recomputed.
    pub fn compute(clock: Hertz, baud: u32, max_period: u32) -> Result<Self, ConfigError> {
        if baud == 0 || clock.0 / baud == 0 {
            return Err(ConfigError::BaudrateTooHigh);
        }
        let mut shift = 0u8;
        loop {
            let period = (clock.0 >> shift) / baud;
            if period == 0 {
                return Err(ConfigError::BaudrateTooHigh);
            }
            if period <= max_period {
                return Ok(Self {
                    period,
                    prescaler_shift: shift,
                });
            }
            if shift == MAX_PRESCALER_SHIFT {
                return Err(ConfigError::BaudrateTooLow);
            }
            shift += 1;
        }
    }
}

/// Timer channel capability consumed by the driver.
///
/// All methods are called either at configuration time (open,
/// `set_baud`, `stop`) or from the port's own interrupt path, never
/// concurrently for one channel.
pub trait CaptureTimer {
    /// Input clock of the counter, before prescaling.
    fn clock(&self) -> Hertz;

    /// Largest period value the counter can be programmed with.
    fn max_period(&self) -> u32;

    /// Program the counter period and prescaler.
    fn set_timebase(&mut self, timebase: &Timebase);

    /// Force the live counter to `ticks`. Used to resynchronize the
    /// bit clock on a start-bit edge.
    fn set_counter(&mut self, ticks: u32);

    /// Enable edge capture on the RX line for the given polarity,
    /// replacing any previously armed polarity.
    fn arm_capture(&mut self, polarity: Polarity);

    /// Disable edge capture.
    fn disarm_capture(&mut self);

    /// Enable the overflow (bit clock) interrupt.
    fn enable_overflow(&mut self);

    /// Disable the overflow interrupt.
    fn disable_overflow(&mut self);
}
