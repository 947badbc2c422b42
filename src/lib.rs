//! Async client for a JSON-over-HTTP game-state server: user accounts,
//! session tokens, named groups with host/member roles, key-value data
//! storage, and long-poll update/input channels.
//!
//! A [`Knecht`] client holds one session. Authenticated operations retry
//! exactly once after a transparent relogin when the server rejects the
//! session token; every other failure is delivered to the caller as-is.

mod client;
mod config;
mod error;
mod groups;
mod poll;
mod session;
mod transport;

pub use client::Knecht;
pub use config::{Config, DEFAULT_TIMEOUT};
pub use error::{KnechtError, Status};
pub use groups::Permission;
pub use poll::{
    InputBatch, InputPoll, MemberInput, PollBatch, PollLoop, PollStop, UpdateBatch, UpdateEntry,
    UpdatePoll,
};
