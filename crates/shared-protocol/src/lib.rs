//! Shared Protocol Definitions for kpxc-cli
//!
//! Message shapes, action names, peer error codes and session states for the
//! password manager's browser-integration socket. Outer envelopes travel in
//! the clear; the payload of every action after the key exchange is a JSON
//! object boxed into the envelope's `message` field.

mod action;
mod codes;
mod error;
mod messages;
mod session;

pub use action::*;
pub use codes::*;
pub use error::*;
pub use messages::*;
pub use session::*;

/// Largest single message the peer will exchange on the socket
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
