//! Core constants, error taxonomy, and the rules-engine collaborator trait.

pub mod constants;
pub mod error;
pub mod traits;

pub use constants::*;
pub use error::{BeerError, FrameCodecError};
pub use traits::{Board, Coord, PlaceOutcome, ShotResult};
