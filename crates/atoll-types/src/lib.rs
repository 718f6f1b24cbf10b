//! Shared types for Atoll.
//!
//! This crate defines the types used across the Atoll workspace: today that
//! is the [`Server`] entry (a name plus its relative weight) that both ring
//! construction and the server directory consume.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A backend server participating in the continuum.
///
/// Servers are identified by name: two entries with the same name describe
/// the same server. The weight expresses relative capacity and controls the
/// server's proportional share of ring points; it must be positive, which
/// the ring builder enforces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Server {
    /// Unique identifier, typically `host:port`.
    pub name: String,
    /// Relative capacity.
    pub weight: u32,
}

impl Server {
    /// Create a server entry.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

impl fmt::Display for Server {
    /// Renders the `name:weight` form used by sync specifications.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.weight)
    }
}
