//! Server directory files for Atoll.
//!
//! A directory file is the line-oriented `<name> <weight>` list a deployment
//! keeps next to its configuration, e.g.:
//!
//! ```text
//! # cache fleet
//! 10.0.1.1:11211 600
//! 10.0.1.2:11211 300
//! ```
//!
//! [`ServerDirectory`] reads such a file into [`Server`] entries and tracks
//! the file's modification time, so a host can poll [`has_changed`] and
//! re-sync its continuum when the fleet definition moves underneath it.
//!
//! [`Server`]: atoll_types::Server
//! [`has_changed`]: ServerDirectory::has_changed

mod directory;
mod error;

pub use directory::{ServerDirectory, sync_spec};
pub use error::DirectoryError;
