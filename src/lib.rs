//! Software-emulated UART ("soft serial").
//!
//! Reconstructs an asynchronous serial byte stream with no UART
//! hardware, using only a timer's input-capture edge interrupts and
//! its overflow interrupt as a bit clock. One timer carries a
//! half-duplex single-wire port or a full-duplex port; two timers
//! give a full-duplex port with independent RX and TX bit clocks.
//!
//! The driver core is hardware-agnostic: it talks to the timer and
//! the line through the [`CaptureTimer`] and [`SerialPin`] capability
//! traits, implemented once per hardware family. Interrupt service
//! routines forward the capture and overflow events to
//! [`SoftUart::on_capture`] / [`SoftUart::on_overflow`]; everything
//! consumer-facing goes through the non-blocking [`PortHandle`].
//!
//! Framing is fixed at 1 start bit (low), 8 data bits LSB-first,
//! 1 stop bit (high), optionally inverted on the wire. No parity, no
//! flow control.
#![cfg_attr(not(test), no_std)]

pub mod gpio;
pub mod ring;
pub mod time;
pub mod timer;

mod rx;
mod tx;

pub mod port;
pub mod registry;

pub use gpio::{Level, Pull, SerialPin};
pub use port::{
    open_dual, stop_dual, Config, Error, PortHandle, RxCallback, SoftUart, SoftUartRx, SoftUartTx,
    SOFTSERIAL_BUFFER_SIZE,
};
pub use registry::{OpenError, MAX_SOFTSERIAL_PORTS};
pub use time::Hertz;
pub use timer::{CaptureTimer, ConfigError, Polarity, Timebase};
