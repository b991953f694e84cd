//! IPC Transport - local socket channel to the password manager
//!
//! Provides a Unix domain socket (named pipe on Windows) connection that
//! carries one JSON object per message, strictly one request at a time.

mod channel;
mod error;
mod socket;

pub use channel::*;
pub use error::*;
pub use socket::*;

use std::time::Duration;

/// Default bound on how long a receive waits for the peer
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of each socket read
pub const READ_CHUNK_SIZE: usize = 8 * 1024;
