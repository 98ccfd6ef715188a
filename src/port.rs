//! Port objects and the consumer-facing handle.
//!
//! A port is opened against a registry channel and splits into two
//! worlds that never share a mutable field:
//!
//! - the driver object ([`SoftUart`], or the [`SoftUartRx`] /
//!   [`SoftUartTx`] halves in dual-timebase mode), owned by the
//!   interrupt glue; its `on_capture` / `on_overflow` methods are the
//!   interrupt entry points and it owns the timer, the pins, and the
//!   state-machine fields;
//! - the [`PortHandle`], owned by consumer code; it only reaches the
//!   lock-free shared [`State`] (ring buffers and counters) and never
//!   blocks.
//!
//! On half-duplex ports the driver object also runs the direction
//! controller: exactly one of edge capture or line drive is active at
//! any time, switching only when a byte is dequeued for sending and
//! back when the queue drains.

use core::sync::atomic::{AtomicU16, Ordering};

use crate::gpio::{Level, Pull, SerialPin};
use crate::registry::{self, Channel, OpenError};
use crate::ring::RingBuffer;
use crate::rx::{self, Edge, RxState};
use crate::timer::{CaptureTimer, ConfigError, Polarity, Timebase};
use crate::tx::{self, TxAction, TxState};

/// Capacity of each of the RX and TX ring buffers, per port.
pub const SOFTSERIAL_BUFFER_SIZE: usize = 256;

/// Spin bound for the blocking `embedded_io` adapters.
const SOFT_SERIAL_RETRY_COUNT: u32 = 5000;

/// Byte sink invoked from interrupt context for each received byte,
/// bypassing the RX ring buffer.
pub type RxCallback = fn(u8);

/// Serial error
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A blocking adapter exhausted its spin bound.
    Timeout,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// Baud rate
    pub baud: u32,
    /// Invert line polarity: a logical 1 drives the line low and the
    /// idle state is low.
    pub inverted: bool,
    /// On half-duplex ports, leave the listening line floating
    /// instead of pulled toward idle.
    pub half_duplex_no_pull: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud: 9600,
            inverted: false,
            half_duplex_no_pull: false,
        }
    }
}

/// Which directions a port was opened with.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Mode {
    Rx,
    Tx,
    RxTx,
}

impl Mode {
    pub(crate) fn rx_enabled(self) -> bool {
        matches!(self, Mode::Rx | Mode::RxTx)
    }

    pub(crate) fn tx_enabled(self) -> bool {
        matches!(self, Mode::Tx | Mode::RxTx)
    }
}

/// Resolved port configuration shared by the state machines.
#[derive(Clone, Copy)]
pub(crate) struct PortConfig {
    pub baud: u32,
    pub mode: Mode,
    pub inverted: bool,
    pub half_duplex: bool,
    pub half_duplex_no_pull: bool,
}

impl PortConfig {
    /// Line level between frames (and for the stop bit).
    pub(crate) fn idle_level(&self) -> Level {
        Level::from(!self.inverted)
    }

    /// Physical line level for a logical bit.
    pub(crate) fn tx_level(&self, bit: bool) -> Level {
        Level::from(bit != self.inverted)
    }

    /// Capture polarity that fires on the given edge class. A leading
    /// edge moves the line toward active-high (away from the start
    /// level), a trailing edge back toward it.
    pub(crate) fn capture_polarity(&self, edge: Edge) -> Polarity {
        let rising = match edge {
            Edge::Leading => !self.inverted,
            Edge::Trailing => self.inverted,
        };
        if rising {
            Polarity::Rising
        } else {
            Polarity::Falling
        }
    }

    /// The start bit begins with the same transition a trailing edge
    /// makes.
    pub(crate) fn start_edge_polarity(&self) -> Polarity {
        self.capture_polarity(Edge::Trailing)
    }

    /// Pull applied to the listening line, toward idle.
    pub(crate) fn rx_pull(&self) -> Pull {
        if self.half_duplex_no_pull {
            Pull::None
        } else if self.inverted {
            Pull::Down
        } else {
            Pull::Up
        }
    }
}

/// Per-channel state shared across the interrupt/consumer boundary.
///
/// Every field is either an SPSC ring buffer or an atomic counter;
/// each side of the boundary writes a disjoint set of them.
pub(crate) struct State {
    rx_buf: RingBuffer<SOFTSERIAL_BUFFER_SIZE>,
    tx_buf: RingBuffer<SOFTSERIAL_BUFFER_SIZE>,
    rx_errors: AtomicU16,
    tx_errors: AtomicU16,
    rx_overruns: AtomicU16,
}

impl State {
    pub(crate) const fn new() -> Self {
        Self {
            rx_buf: RingBuffer::new(),
            tx_buf: RingBuffer::new(),
            rx_errors: AtomicU16::new(0),
            tx_errors: AtomicU16::new(0),
            rx_overruns: AtomicU16::new(0),
        }
    }

    pub(crate) fn rx_buf(&self) -> &RingBuffer<SOFTSERIAL_BUFFER_SIZE> {
        &self.rx_buf
    }

    pub(crate) fn tx_buf(&self) -> &RingBuffer<SOFTSERIAL_BUFFER_SIZE> {
        &self.tx_buf
    }

    /// Deliver a received byte to the RX buffer, counting the drop if
    /// the consumer has fallen behind.
    pub(crate) fn store_rx_byte(&self, byte: u8) {
        if !self.rx_buf.push(byte) {
            self.rx_overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn note_rx_error(&self) {
        self.rx_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_tx_error(&self) {
        self.tx_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rx_error_count(&self) -> u16 {
        self.rx_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn tx_error_count(&self) -> u16 {
        self.tx_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn rx_overrun_count(&self) -> u16 {
        self.rx_overruns.load(Ordering::Relaxed)
    }

    /// Fresh-port reset, used by the registry at claim time, before
    /// any interrupt can reach the channel.
    pub(crate) fn reset(&self) {
        self.rx_buf.reset();
        self.tx_buf.reset();
        self.rx_errors.store(0, Ordering::Relaxed);
        self.tx_errors.store(0, Ordering::Relaxed);
        self.rx_overruns.store(0, Ordering::Relaxed);
    }
}

/// The one or two lines a port owns.
enum LinePins<P: SerialPin> {
    /// Half-duplex single wire, flipped between directions.
    Shared(P),
    /// Independent lines; either may be absent on a one-direction
    /// port.
    Split { rx: Option<P>, tx: Option<P> },
}

// ==========
// drivers

/// Single-timer soft UART port.
///
/// Covers half-duplex single-wire operation and full-duplex on one
/// shared bit clock. Owned by the interrupt glue: wire the timer's
/// capture interrupt to [`Self::on_capture`] and its overflow
/// interrupt to [`Self::on_overflow`].
pub struct SoftUart<T: CaptureTimer, P: SerialPin> {
    channel: &'static Channel,
    timer: T,
    line: LinePins<P>,
    cfg: PortConfig,
    timebase: Timebase,
    rx_callback: Option<RxCallback>,
    rx: RxState,
    tx: TxState,
}

impl<T: CaptureTimer, P: SerialPin> SoftUart<T, P> {
    /// Open a full-duplex port with independent RX and TX pins on one
    /// timer.
    pub fn new(
        channel: usize,
        timer: T,
        rx_pin: P,
        tx_pin: P,
        rx_callback: Option<RxCallback>,
        config: Config,
    ) -> Result<(Self, PortHandle), OpenError> {
        Self::new_inner(
            channel,
            timer,
            LinePins::Split {
                rx: Some(rx_pin),
                tx: Some(tx_pin),
            },
            Mode::RxTx,
            false,
            rx_callback,
            config,
        )
    }

    /// Open a half-duplex port on a single shared wire.
    ///
    /// The port starts out listening; it takes the line over when a
    /// byte is queued and hands it back once the queue drains.
    pub fn new_half_duplex(
        channel: usize,
        timer: T,
        pin: P,
        rx_callback: Option<RxCallback>,
        config: Config,
    ) -> Result<(Self, PortHandle), OpenError> {
        Self::new_inner(channel, timer, LinePins::Shared(pin), Mode::RxTx, true, rx_callback, config)
    }

    /// Open a receive-only port.
    pub fn new_rx_only(
        channel: usize,
        timer: T,
        rx_pin: P,
        rx_callback: Option<RxCallback>,
        config: Config,
    ) -> Result<(Self, PortHandle), OpenError> {
        Self::new_inner(
            channel,
            timer,
            LinePins::Split {
                rx: Some(rx_pin),
                tx: None,
            },
            Mode::Rx,
            false,
            rx_callback,
            config,
        )
    }

    /// Open a transmit-only port.
    pub fn new_tx_only(channel: usize, timer: T, tx_pin: P, config: Config) -> Result<(Self, PortHandle), OpenError> {
        Self::new_inner(
            channel,
            timer,
            LinePins::Split {
                rx: None,
                tx: Some(tx_pin),
            },
            Mode::Tx,
            false,
            None,
            config,
        )
    }

    fn new_inner(
        channel: usize,
        mut timer: T,
        line: LinePins<P>,
        mode: Mode,
        half_duplex: bool,
        rx_callback: Option<RxCallback>,
        config: Config,
    ) -> Result<(Self, PortHandle), OpenError> {
        let chan = registry::claim(channel)?;

        let cfg = PortConfig {
            baud: config.baud,
            mode,
            inverted: config.inverted,
            half_duplex,
            half_duplex_no_pull: config.half_duplex_no_pull,
        };

        let timebase = match Timebase::compute(timer.clock(), cfg.baud, timer.max_period()) {
            Ok(tb) => tb,
            Err(e) => {
                registry::release(chan);
                return Err(OpenError::Config(e));
            }
        };
        timer.set_timebase(&timebase);

        let mut this = Self {
            channel: chan,
            timer,
            line,
            cfg,
            timebase,
            rx_callback,
            rx: RxState::new(),
            tx: TxState::new(),
        };

        if half_duplex {
            this.activate_receive();
        } else {
            if this.cfg.mode.tx_enabled() {
                this.activate_transmit();
            }
            if this.cfg.mode.rx_enabled() {
                this.activate_receive();
            }
        }
        this.timer.enable_overflow();

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "softserial: ch{} open, baud {}, period {} >> {}",
            channel,
            cfg.baud,
            timebase.period,
            timebase.prescaler_shift
        );

        Ok((this, PortHandle { state: chan.state() }))
    }

    /// Input-capture interrupt entry point: an edge on the RX line.
    pub fn on_capture(&mut self) {
        if !self.cfg.mode.rx_enabled() || !self.rx.receiving {
            return;
        }
        // A start-bit resync rewinds the bit clock this transmitter
        // is also running on.
        let tx_in_flight = self.cfg.mode.tx_enabled() && self.tx.active;
        let chan = self.channel;
        rx::on_edge(
            &mut self.rx,
            &mut self.timer,
            chan.state(),
            &self.cfg,
            self.timebase.period,
            tx_in_flight,
        );
    }

    /// Overflow interrupt entry point: one bit period elapsed.
    ///
    /// Runs the TX shifter, applies any direction change it asked
    /// for, then advances the receiver.
    pub fn on_overflow(&mut self) {
        let chan = self.channel;
        let mut action = TxAction::None;
        if self.cfg.mode.tx_enabled() {
            let pin = match &mut self.line {
                LinePins::Shared(p) => Some(p),
                LinePins::Split { tx, .. } => tx.as_mut(),
            };
            if let Some(pin) = pin {
                action = tx::on_tick(&mut self.tx, pin, chan.state(), &self.cfg, self.rx.receiving);
            }
        }

        match action {
            TxAction::SwitchToReceive => self.activate_receive(),
            TxAction::SwitchToTransmit => {
                self.deactivate_receive();
                self.activate_transmit();
            }
            TxAction::None => {}
        }

        if self.cfg.mode.rx_enabled() && self.rx.receiving {
            rx::on_tick(&mut self.rx, &mut self.timer, chan.state(), &self.cfg, self.rx_callback);
        }
    }

    /// Reprogram the bit clock for a new baud rate.
    ///
    /// Safe to call while the port is running; ring-buffer contents
    /// are untouched.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), ConfigError> {
        let timebase = Timebase::compute(self.timer.clock(), baud, self.timer.max_period())?;
        critical_section::with(|_| {
            self.timer.set_timebase(&timebase);
        });
        self.timebase = timebase;
        self.cfg.baud = baud;

        #[cfg(feature = "defmt")]
        defmt::trace!("softserial: set_baud {}, period {} >> {}", baud, timebase.period, timebase.prescaler_shift);

        Ok(())
    }

    /// Shut the port down and release its registry channel for
    /// reopening. The line is left floating.
    ///
    /// Takes the consumer handle back: the channel's buffers are
    /// reused by the next port opened on it, and a surviving handle
    /// would be a second reader on that port's queues.
    pub fn stop(mut self, handle: PortHandle) {
        debug_assert!(core::ptr::eq(handle.state, self.channel.state()));
        critical_section::with(|_| {
            self.timer.disable_overflow();
            self.deactivate_receive();
            self.deactivate_transmit();
        });
        drop(handle);
        registry::release(self.channel);
    }

    // ==========
    // direction controller (half-duplex arbitration; also used for
    // initial direction setup)

    fn activate_receive(&mut self) {
        let pull = self.cfg.rx_pull();
        if let Some(pin) = self.rx_side_pin() {
            pin.set_as_input(pull);
        }
        self.rx.receiving = true;
        self.rx.searching_for_start_bit = true;
        self.rx.bit_index = 0;
        self.timer.arm_capture(self.cfg.start_edge_polarity());
    }

    fn deactivate_receive(&mut self) {
        self.timer.disarm_capture();
        if let Some(pin) = self.rx_side_pin() {
            pin.set_as_input(Pull::None);
        }
        self.rx.receiving = false;
    }

    fn activate_transmit(&mut self) {
        let idle = self.cfg.idle_level();
        if let Some(pin) = self.tx_side_pin() {
            pin.set_as_output(idle);
        }
    }

    fn deactivate_transmit(&mut self) {
        if let Some(pin) = self.tx_side_pin() {
            pin.set_as_input(Pull::None);
        }
    }

    fn rx_side_pin(&mut self) -> Option<&mut P> {
        match &mut self.line {
            LinePins::Shared(p) => Some(p),
            LinePins::Split { rx, .. } => rx.as_mut(),
        }
    }

    fn tx_side_pin(&mut self) -> Option<&mut P> {
        match &mut self.line {
            LinePins::Shared(p) => Some(p),
            LinePins::Split { tx, .. } => tx.as_mut(),
        }
    }
}

/// Receive half of a dual-timebase port. Runs on its own capture
/// timer, fully independent of the transmit half.
pub struct SoftUartRx<T: CaptureTimer, P: SerialPin> {
    channel: &'static Channel,
    timer: T,
    pin: P,
    cfg: PortConfig,
    timebase: Timebase,
    rx_callback: Option<RxCallback>,
    rx: RxState,
}

impl<T: CaptureTimer, P: SerialPin> SoftUartRx<T, P> {
    /// Input-capture interrupt entry point.
    pub fn on_capture(&mut self) {
        if !self.rx.receiving {
            return;
        }
        let chan = self.channel;
        // Independent timers: a resync cannot disturb a transmission.
        rx::on_edge(&mut self.rx, &mut self.timer, chan.state(), &self.cfg, self.timebase.period, false);
    }

    /// RX bit-clock overflow entry point.
    pub fn on_overflow(&mut self) {
        if !self.rx.receiving {
            return;
        }
        let chan = self.channel;
        rx::on_tick(&mut self.rx, &mut self.timer, chan.state(), &self.cfg, self.rx_callback);
    }

    /// Reprogram the RX bit clock. Call the transmit half's
    /// [`SoftUartTx::set_baud`] as well to change the port's rate.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), ConfigError> {
        let timebase = Timebase::compute(self.timer.clock(), baud, self.timer.max_period())?;
        critical_section::with(|_| {
            self.timer.set_timebase(&timebase);
        });
        self.timebase = timebase;
        self.cfg.baud = baud;
        Ok(())
    }
}

/// Transmit half of a dual-timebase port.
pub struct SoftUartTx<T: CaptureTimer, P: SerialPin> {
    channel: &'static Channel,
    timer: T,
    pin: P,
    cfg: PortConfig,
    timebase: Timebase,
    tx: TxState,
}

impl<T: CaptureTimer, P: SerialPin> SoftUartTx<T, P> {
    /// TX bit-clock overflow entry point.
    pub fn on_overflow(&mut self) {
        let chan = self.channel;
        // Never half-duplex, so the returned action is always None.
        let _ = tx::on_tick(&mut self.tx, &mut self.pin, chan.state(), &self.cfg, false);
    }

    /// Reprogram the TX bit clock.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), ConfigError> {
        let timebase = Timebase::compute(self.timer.clock(), baud, self.timer.max_period())?;
        critical_section::with(|_| {
            self.timer.set_timebase(&timebase);
        });
        self.timebase = timebase;
        self.cfg.baud = baud;
        Ok(())
    }
}

/// Open a full-duplex port with independent RX and TX timers.
///
/// The two halves share nothing mutable, so their interrupts may
/// genuinely preempt each other without locking.
#[allow(clippy::type_complexity)]
pub fn open_dual<TR, TT, PR, PT>(
    channel: usize,
    mut rx_timer: TR,
    mut tx_timer: TT,
    mut rx_pin: PR,
    mut tx_pin: PT,
    rx_callback: Option<RxCallback>,
    config: Config,
) -> Result<(SoftUartRx<TR, PR>, SoftUartTx<TT, PT>, PortHandle), OpenError>
where
    TR: CaptureTimer,
    TT: CaptureTimer,
    PR: SerialPin,
    PT: SerialPin,
{
    let chan = registry::claim(channel)?;

    let rx_cfg = PortConfig {
        baud: config.baud,
        mode: Mode::Rx,
        inverted: config.inverted,
        half_duplex: false,
        half_duplex_no_pull: false,
    };
    let tx_cfg = PortConfig { mode: Mode::Tx, ..rx_cfg };

    let rx_timebase = match Timebase::compute(rx_timer.clock(), config.baud, rx_timer.max_period()) {
        Ok(tb) => tb,
        Err(e) => {
            registry::release(chan);
            return Err(OpenError::Config(e));
        }
    };
    let tx_timebase = match Timebase::compute(tx_timer.clock(), config.baud, tx_timer.max_period()) {
        Ok(tb) => tb,
        Err(e) => {
            registry::release(chan);
            return Err(OpenError::Config(e));
        }
    };

    rx_timer.set_timebase(&rx_timebase);
    tx_timer.set_timebase(&tx_timebase);

    rx_pin.set_as_input(rx_cfg.rx_pull());
    rx_timer.arm_capture(rx_cfg.start_edge_polarity());
    rx_timer.enable_overflow();

    tx_pin.set_as_output(tx_cfg.idle_level());
    tx_timer.enable_overflow();

    let mut rx_state = RxState::new();
    rx_state.receiving = true;

    let rx_half = SoftUartRx {
        channel: chan,
        timer: rx_timer,
        pin: rx_pin,
        cfg: rx_cfg,
        timebase: rx_timebase,
        rx_callback,
        rx: rx_state,
    };
    let tx_half = SoftUartTx {
        channel: chan,
        timer: tx_timer,
        pin: tx_pin,
        cfg: tx_cfg,
        timebase: tx_timebase,
        tx: TxState::new(),
    };

    Ok((rx_half, tx_half, PortHandle { state: chan.state() }))
}

/// Shut down a dual-timebase port, releasing its channel. The
/// consumer handle comes back with the halves, as in
/// [`SoftUart::stop`].
pub fn stop_dual<TR, TT, PR, PT>(mut rx: SoftUartRx<TR, PR>, mut tx: SoftUartTx<TT, PT>, handle: PortHandle)
where
    TR: CaptureTimer,
    TT: CaptureTimer,
    PR: SerialPin,
    PT: SerialPin,
{
    debug_assert!(core::ptr::eq(handle.state, rx.channel.state()));
    critical_section::with(|_| {
        rx.timer.disarm_capture();
        rx.timer.disable_overflow();
        rx.pin.set_as_input(Pull::None);
        tx.timer.disable_overflow();
        tx.pin.set_as_input(Pull::None);
    });
    drop(handle);
    registry::release(rx.channel);
}

// ==========
// consumer handle

/// Consumer-context surface of a port.
///
/// Move-only: the ring buffers are single-consumer, and handing the
/// handle around is how that discipline is kept. It is surrendered to
/// [`SoftUart::stop`] / [`stop_dual`] when the port shuts down. No
/// method blocks.
pub struct PortHandle {
    state: &'static State,
}

impl PortHandle {
    /// Pop one received byte, if any.
    ///
    /// Always `None` on a port opened with an RX callback: bytes go
    /// to the callback instead of the buffer.
    pub fn read(&mut self) -> Option<u8> {
        self.state.rx_buf().pop()
    }

    /// Queue one byte for transmission. Returns `false` if the TX
    /// buffer was full and the byte was dropped; poll
    /// [`Self::bytes_free`] to avoid that.
    pub fn write(&mut self, byte: u8) -> bool {
        self.state.tx_buf().push(byte)
    }

    /// Received bytes waiting to be read.
    pub fn bytes_waiting(&self) -> usize {
        self.state.rx_buf().len()
    }

    /// Space left in the TX queue.
    pub fn bytes_free(&self) -> usize {
        self.state.tx_buf().free_space()
    }

    /// True when the TX queue is drained. The final frame may still
    /// be shifting out on the wire.
    pub fn is_tx_buffer_empty(&self) -> bool {
        self.state.tx_buf().is_empty()
    }

    /// Malformed frames dropped by the receiver.
    pub fn rx_errors(&self) -> u16 {
        self.state.rx_error_count()
    }

    /// Transmissions possibly corrupted by a start-bit resync on a
    /// shared timer.
    pub fn tx_errors(&self) -> u16 {
        self.state.tx_error_count()
    }

    /// Received bytes dropped because the RX buffer was full.
    pub fn rx_overruns(&self) -> u16 {
        self.state.rx_overrun_count()
    }
}

// ==========
// trait impls

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::TimedOut
    }
}

impl embedded_hal_nb::serial::Error for Error {
    fn kind(&self) -> embedded_hal_nb::serial::ErrorKind {
        embedded_hal_nb::serial::ErrorKind::Other
    }
}

impl embedded_io::ErrorType for PortHandle {
    type Error = Error;
}

impl embedded_io::ReadReady for PortHandle {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bytes_waiting() > 0)
    }
}

impl embedded_io::WriteReady for PortHandle {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bytes_free() > 0)
    }
}

impl embedded_io::Read for PortHandle {
    /// Spin until at least one byte arrives, then drain what is
    /// available. The interrupts keep making progress while we spin;
    /// a silent line ends in [`Error::Timeout`].
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut retry = 0_u32;
        while self.bytes_waiting() == 0 {
            if retry > SOFT_SERIAL_RETRY_COUNT {
                return Err(Error::Timeout);
            }
            retry += 1;
        }

        let mut n = 0;
        while n < buf.len() {
            match self.state.rx_buf().pop() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::Write for PortHandle {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut retry = 0_u32;
        while self.bytes_free() == 0 {
            if retry > SOFT_SERIAL_RETRY_COUNT {
                return Err(Error::Timeout);
            }
            retry += 1;
        }

        let mut n = 0;
        while n < buf.len() && self.state.tx_buf().push(buf[n]) {
            n += 1;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let mut retry = 0_u32;
        while !self.is_tx_buffer_empty() {
            if retry > SOFT_SERIAL_RETRY_COUNT {
                return Err(Error::Timeout);
            }
            retry += 1;
        }
        Ok(())
    }
}

impl embedded_hal_nb::serial::ErrorType for PortHandle {
    type Error = Error;
}

impl embedded_hal_nb::serial::Read<u8> for PortHandle {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.state.rx_buf().pop().ok_or(nb::Error::WouldBlock)
    }
}

impl embedded_hal_nb::serial::Write<u8> for PortHandle {
    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        if self.state.tx_buf().push(byte) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.is_tx_buffer_empty() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}
