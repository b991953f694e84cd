//! Association Store - durable client identities per database
//!
//! Remembers, for every database the password manager has served, the
//! identity this client registered with it, so later runs can skip the
//! interactive association prompt.

mod error;
mod store;

pub use error::*;
pub use store::*;

/// File name of the store inside the config directory
pub const STORE_FILE_NAME: &str = "associations.json";
