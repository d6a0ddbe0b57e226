//! Crate-wide error and result types.

use derive_more::{Display, Error};

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by the simulation, frame link, and display devices.
///
/// Fatal variants (`TooManyParticles`, `LinkDesync`, `TaskSpawn`) indicate a
/// configuration or logic error; callers halt and report rather than retry.
/// `FrameTimeout` is the one recoverable variant: the producer skips that
/// tick and keeps running.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum Error {
    /// A particle table exceeded the simulation's fixed capacity.
    /// There is no partial-load recovery path.
    #[display("particle table holds {requested} entries but capacity is {capacity}")]
    TooManyParticles {
        /// Number of entries in the offending table.
        requested: usize,
        /// Fixed capacity of the simulation.
        capacity: usize,
    },

    /// A frame-link token slot was already full when a token was offered.
    /// The producer and display contexts have desynchronized.
    #[display("frame link desynchronized: token slot already full")]
    LinkDesync,

    /// The producer's bounded wait for the display's consumed token expired.
    #[display("timed out waiting for the display to release the frame")]
    FrameTimeout,

    /// Failed to spawn a device task.
    #[display("task spawn failed: {_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),
}
