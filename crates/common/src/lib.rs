//! Shared types for the Spotify token gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
