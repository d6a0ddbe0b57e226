//! Frame synchronization between the simulation and display contexts.
//!
//! A [`FrameLink`] carries exactly two token values, [`FrameToken::Ready`]
//! (simulation → display: "new frame data is staged") and
//! [`FrameToken::Consumed`] (display → simulation: "the frame was scanned
//! out, the staging buffer is reusable"), over one single-slot cell per
//! direction. The single slot is load-bearing: at most one unconsumed token
//! of each kind can be outstanding, which bounds the pipeline to exactly one
//! frame in flight and turns display overload into producer-side frame
//! skipping instead of unbounded queuing.
//!
//! The two halves are split with [`FrameLink::sim_link`] and
//! [`FrameLink::display_link`]; each context holds only its own half.

use portable_atomic::{AtomicU8, Ordering};

use crate::{Error, Result};

#[cfg(not(feature = "host"))]
use embassy_time::{Duration, Instant, Timer};

/// The two messages the link can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameToken {
    /// Simulation → display: a new frame snapshot is staged.
    Ready,
    /// Display → simulation: the previous frame is fully scanned out and the
    /// staging buffer may be overwritten.
    Consumed,
}

const EMPTY: u8 = 0;

impl FrameToken {
    // Distinct non-zero wire values, so a slot holding anything unexpected
    // reads as empty instead of being mistaken for the other token.
    const fn wire(self) -> u8 {
        match self {
            Self::Ready => 0xa1,
            Self::Consumed => 0xb2,
        }
    }
}

/// One single-slot token cell. Offering to a full cell fails; that failure is
/// how protocol desynchronization is detected.
struct TokenCell(AtomicU8);

impl TokenCell {
    const fn new(seed: Option<FrameToken>) -> Self {
        Self(AtomicU8::new(match seed {
            Some(token) => token.wire(),
            None => EMPTY,
        }))
    }

    fn offer(&self, token: FrameToken) -> bool {
        self.0
            .compare_exchange(EMPTY, token.wire(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take(&self, token: FrameToken) -> bool {
        self.0
            .compare_exchange(token.wire(), EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The inter-context handshake channel: one token slot per direction.
///
/// Lives in a `static` so both execution contexts can reach it:
///
/// ```rust,ignore
/// static LINK: FrameLink = FrameLink::new();
/// let sim_link = LINK.sim_link();         // producer context
/// let display_link = LINK.display_link(); // display context
/// ```
pub struct FrameLink {
    ready: TokenCell,
    consumed: TokenCell,
}

impl FrameLink {
    /// Create a link.
    ///
    /// The consumed slot starts full: at boot the back buffer is trivially
    /// reusable, so the producer's first wait succeeds immediately.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: TokenCell::new(None),
            consumed: TokenCell::new(Some(FrameToken::Consumed)),
        }
    }

    /// The simulation (producer) half.
    #[must_use]
    pub fn sim_link(&self) -> SimLink<'_> {
        SimLink(self)
    }

    /// The display (consumer) half.
    #[must_use]
    pub fn display_link(&self) -> DisplayLink<'_> {
        DisplayLink(self)
    }
}

impl Default for FrameLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half of a [`FrameLink`].
#[derive(Clone, Copy)]
pub struct SimLink<'a>(&'a FrameLink);

impl SimLink<'_> {
    /// Announce that a new frame snapshot is staged.
    ///
    /// # Errors
    ///
    /// [`Error::LinkDesync`] if the previous ready token was never taken;
    /// the contexts have desynchronized and continuing is unsafe.
    pub fn publish_ready(&self) -> Result<()> {
        if self.0.ready.offer(FrameToken::Ready) {
            Ok(())
        } else {
            Err(Error::LinkDesync)
        }
    }

    /// Non-blocking check for the display's consumed token.
    #[must_use]
    pub fn try_take_consumed(&self) -> bool {
        self.0.consumed.take(FrameToken::Consumed)
    }

    /// Wait for the display's consumed token, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// [`Error::FrameTimeout`] if the display has not released the frame
    /// within the timeout. Recoverable: skip this tick's simulation step and
    /// try again next tick.
    #[cfg(not(feature = "host"))]
    pub async fn wait_consumed(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_take_consumed() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::FrameTimeout);
            }
            Timer::after(Duration::from_micros(50)).await;
        }
    }
}

/// Consumer half of a [`FrameLink`].
#[derive(Clone, Copy)]
pub struct DisplayLink<'a>(&'a FrameLink);

impl DisplayLink<'_> {
    /// Non-blocking poll for a staged frame. Called from deep inside the scan
    /// loop, so it must never block.
    #[must_use]
    pub fn poll_ready(&self) -> bool {
        self.0.ready.take(FrameToken::Ready)
    }

    /// Hand the staging buffer back to the producer after a buffer swap.
    ///
    /// # Errors
    ///
    /// [`Error::LinkDesync`] if the slot is already full. The producer should
    /// have taken the previous token before this frame completed; a full slot
    /// means the handshake logic is broken and the error is fatal.
    pub fn publish_consumed(&self) -> Result<()> {
        if self.0.consumed.offer(FrameToken::Consumed) {
            Ok(())
        } else {
            Err(Error::LinkDesync)
        }
    }
}
