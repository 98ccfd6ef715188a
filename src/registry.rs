//! Fixed-size port registry.
//!
//! Each soft-serial channel the platform exposes has one slot here:
//! an explicit lifecycle stage and the channel's shared [`State`]
//! (ring buffers and counters), which must outlive both the
//! interrupt and the consumer side and therefore lives in a static
//! table rather than inside any port object.
//!
//! Lifecycle: `Uninitialized -> Ready` at first open, `Ready ->
//! Stopped` when a port is shut down, `Stopped -> Ready` on reopen.
//! Claiming resets the channel's buffers and counters; a failed open
//! leaves no partial state behind.

use core::sync::atomic::{AtomicU8, Ordering};

use static_assertions::const_assert;

use crate::port::{State, SOFTSERIAL_BUFFER_SIZE};
use crate::timer::ConfigError;

/// Number of soft-serial channels the registry can hand out.
pub const MAX_SOFTSERIAL_PORTS: usize = 2;

const_assert!(MAX_SOFTSERIAL_PORTS > 0);
const_assert!(SOFTSERIAL_BUFFER_SIZE.is_power_of_two());

/// Open Error
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenError {
    /// Channel id outside the registry table.
    InvalidChannel,
    /// Channel already open.
    ChannelInUse,
    /// Bit timebase cannot be programmed for the requested baud rate.
    Config(ConfigError),
}

impl From<ConfigError> for OpenError {
    fn from(e: ConfigError) -> Self {
        OpenError::Config(e)
    }
}

const STAGE_UNINITIALIZED: u8 = 0;
const STAGE_STOPPED: u8 = 1;
const STAGE_READY: u8 = 2;

/// One registry slot.
pub(crate) struct Channel {
    stage: AtomicU8,
    state: State,
}

impl Channel {
    const fn new() -> Self {
        Self {
            stage: AtomicU8::new(STAGE_UNINITIALIZED),
            state: State::new(),
        }
    }

    pub(crate) fn state(&self) -> &State {
        &self.state
    }
}

static CHANNELS: [Channel; MAX_SOFTSERIAL_PORTS] = {
    const SLOT: Channel = Channel::new();
    [SLOT; MAX_SOFTSERIAL_PORTS]
};

/// Claim a channel for a new port, resetting its shared state.
pub(crate) fn claim(channel: usize) -> Result<&'static Channel, OpenError> {
    let chan = CHANNELS.get(channel).ok_or(OpenError::InvalidChannel)?;

    let mut stage = STAGE_UNINITIALIZED;
    loop {
        match chan
            .stage
            .compare_exchange(stage, STAGE_READY, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => break,
            Err(STAGE_STOPPED) if stage != STAGE_STOPPED => stage = STAGE_STOPPED,
            Err(_) => return Err(OpenError::ChannelInUse),
        }
    }

    chan.state.reset();
    Ok(chan)
}

/// Return a channel to the reopenable `Stopped` stage.
pub(crate) fn release(chan: &'static Channel) {
    chan.stage.store(STAGE_STOPPED, Ordering::Release);
}
