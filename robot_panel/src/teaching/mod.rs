//! Timed teaching programs: loading and playback.

mod executor;
mod program;

pub use executor::{PlaybackOutcome, PlaybackState, TeachingHandle};
pub(crate) use executor::run_program;
pub use program::*;
