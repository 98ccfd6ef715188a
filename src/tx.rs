//! TX bit-shifter state machine.
//!
//! Runs once per bit-clock tick. A queued byte is framed as
//! `stop | data << 1` with the start bit implicitly 0 at the bottom,
//! then shifted onto the line LSB-first, one bit period per tick.
//! Direction changes on half-duplex ports are not performed here;
//! they are reported back to the port layer, which owns the pin and
//! the capture unit.

use crate::gpio::SerialPin;
use crate::port::{PortConfig, State};

/// 1 start + 8 data + 1 stop.
pub(crate) const TX_TOTAL_BITS: i8 = 10;

/// Stop bit position in the outgoing shift register. The start bit is
/// the implicit 0 below the data.
pub(crate) const TX_STOP_BIT_POS: u16 = 9;

pub(crate) struct TxState {
    pub active: bool,
    pub bits_left: i8,
    pub shadow: u16,
}

impl TxState {
    pub(crate) const fn new() -> Self {
        Self {
            active: false,
            bits_left: 0,
            shadow: 0,
        }
    }
}

/// Frame one byte for transmission.
pub(crate) fn frame_byte(byte: u8) -> u16 {
    (1 << TX_STOP_BIT_POS) | ((byte as u16) << 1)
}

/// Direction change requested by the shifter, executed by the port.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum TxAction {
    None,
    /// Queue drained and nothing in flight: hand the line back to the
    /// receiver.
    SwitchToReceive,
    /// A byte was just dequeued while the line was listening: take
    /// the line over for transmit.
    SwitchToTransmit,
}

/// Bit-clock tick. `receiving` is the direction controller's current
/// state; only consulted on half-duplex ports.
pub(crate) fn on_tick<P: SerialPin>(
    tx: &mut TxState,
    pin: &mut P,
    state: &State,
    cfg: &PortConfig,
    receiving: bool,
) -> TxAction {
    if !tx.active {
        match state.tx_buf().pop() {
            None => {
                if cfg.half_duplex && !receiving {
                    return TxAction::SwitchToReceive;
                }
                return TxAction::None;
            }
            Some(byte) => {
                tx.shadow = frame_byte(byte);
                tx.bits_left = TX_TOTAL_BITS;
                tx.active = true;
                // First bit goes out on the next tick; on half-duplex
                // the line must be ours before then.
                if cfg.half_duplex && receiving {
                    return TxAction::SwitchToTransmit;
                }
                return TxAction::None;
            }
        }
    }

    if tx.bits_left > 0 {
        let bit = tx.shadow & 1 != 0;
        tx.shadow >>= 1;
        pin.set_level(cfg.tx_level(bit));
        tx.bits_left -= 1;
        return TxAction::None;
    }

    tx.active = false;
    TxAction::None
}
