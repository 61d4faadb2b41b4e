//! Retry and pacing primitives shared by the state handlers.

pub mod challenge;
pub mod retry;
pub mod typing;

pub use challenge::{solve_challenge_async, ChallengeSpec};
pub use retry::{retry_activate, retry_transient};
pub use typing::{paced_type, KeystrokeDelay};
