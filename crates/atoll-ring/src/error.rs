//! Error types for continuum construction and lookup.

/// Errors produced by continuum construction, lookup, and membership
/// operations.
///
/// All validation happens before a new ring is published, so any error
/// from a mutating operation leaves the previously installed ring (and the
/// membership table) fully intact.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Ring construction was asked to place zero servers.
    #[error("cannot build a continuum from an empty server set")]
    EmptyServerSet,

    /// A lookup ran against a continuum with no servers.
    #[error("no servers available")]
    NoServersAvailable,

    /// A server was given a zero weight; weights must be positive.
    #[error("server {0} has invalid weight 0")]
    InvalidWeight(String),

    /// A removal named a server that is not in the set.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// An entry in a sync specification could not be parsed.
    #[error("malformed sync entry: {0:?}")]
    MalformedSyncSpec(String),
}
