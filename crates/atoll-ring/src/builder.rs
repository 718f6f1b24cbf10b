//! Weighted point generation and ring assembly.
//!
//! [`ContinuumBuilder`] turns a weighted server set into an immutable
//! [`Ring`]: each server receives a share of the total point budget
//! proportional to its weight (never less than one point), the points are
//! derived from MD5 digests of `"{name}-{index}"` labels, and the whole
//! sequence is sorted for binary-search lookup.

use std::collections::BTreeMap;
use std::fmt::Write;

use atoll_types::Server;
use tracing::debug;

use crate::error::RingError;
use crate::hash::{digest, hash32, split_digest};

/// Ring points given to a server holding an equal share of the total
/// weight. 160 is the classic budget: 40 digests of 4 points each.
pub const POINTS_PER_SERVER: usize = 160;

/// A single `(hash, server)` binding placed on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Position on the 32-bit ring.
    pub hash: u32,
    /// Index into the owning [`Ring`]'s server table.
    pub server: u32,
}

/// An immutable, sorted ring snapshot.
///
/// Built once by [`ContinuumBuilder`] and never mutated: membership changes
/// build a replacement snapshot instead. The server table is sorted by
/// name and points sort by `(hash, server index)`, so equal hash values
/// resolve to the lexicographically smallest server name and rebuilds are
/// reproducible.
#[derive(Debug)]
pub struct Ring {
    points: Vec<Point>,
    servers: Vec<Server>,
    total_weight: u64,
}

impl Ring {
    /// The zero-server, zero-point ring. Lookups against it fail.
    pub(crate) fn empty() -> Self {
        Self {
            points: Vec::new(),
            servers: Vec::new(),
            total_weight: 0,
        }
    }

    /// Map a key to its owning server.
    ///
    /// Hashes the key and binary-searches for the first point at or after
    /// that position, wrapping to the first point when the hash lands past
    /// the last one.
    pub fn server_for(&self, key: &[u8]) -> Result<&Server, RingError> {
        self.owner_of(hash32(key))
            .ok_or(RingError::NoServersAvailable)
    }

    /// Find the server owning a raw ring position, or `None` on an empty
    /// ring.
    pub fn owner_of(&self, hash: u32) -> Option<&Server> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.hash < hash);
        let point = self.points.get(idx).unwrap_or(&self.points[0]);
        Some(&self.servers[point.server as usize])
    }

    /// The sorted point sequence.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The server table, sorted by name. Point indices refer into it.
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Sum of all server weights.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Number of servers on the ring.
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Number of points on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Render a human-readable summary: ring size, total weight, and each
    /// server's share of weight and points. Diagnostic output only; the
    /// format is not a stable contract.
    pub fn describe(&self) -> String {
        if self.servers.is_empty() {
            return "continuum: empty (0 servers, 0 points)".to_string();
        }

        let mut out = format!(
            "continuum: {} servers, {} points, total weight {}\n",
            self.servers.len(),
            self.points.len(),
            self.total_weight,
        );

        let mut counts = vec![0usize; self.servers.len()];
        for point in &self.points {
            counts[point.server as usize] += 1;
        }

        for (server, count) in self.servers.iter().zip(&counts) {
            let weight_share = 100.0 * f64::from(server.weight) / self.total_weight as f64;
            let point_share = 100.0 * *count as f64 / self.points.len() as f64;
            let _ = writeln!(
                out,
                "  {} weight {} ({weight_share:.1}% of weight) points {count} ({point_share:.1}% of ring)",
                server.name, server.weight,
            );
        }
        out
    }
}

/// Builds sorted [`Ring`] snapshots from weighted server sets.
///
/// The builder is stateless apart from the per-server point budget; the
/// default of [`POINTS_PER_SERVER`] matches the reference continuum and is
/// pinned by golden-output tests. A larger budget smooths the
/// key distribution at the cost of a bigger sort on every rebuild.
#[derive(Debug, Clone)]
pub struct ContinuumBuilder {
    points_per_server: usize,
}

impl Default for ContinuumBuilder {
    fn default() -> Self {
        Self {
            points_per_server: POINTS_PER_SERVER,
        }
    }
}

impl ContinuumBuilder {
    /// Builder with the default point budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with a custom per-server point budget.
    pub fn with_points_per_server(points_per_server: usize) -> Self {
        Self { points_per_server }
    }

    /// Build a sorted ring from the given servers.
    ///
    /// Duplicate names collapse to the last entry. Fails with
    /// [`RingError::EmptyServerSet`] on an empty input and
    /// [`RingError::InvalidWeight`] on a zero weight; nothing is allocated
    /// for the ring until the whole input validates.
    pub fn build(&self, servers: &[Server]) -> Result<Ring, RingError> {
        if servers.is_empty() {
            return Err(RingError::EmptyServerSet);
        }

        let mut by_name: BTreeMap<&str, u32> = BTreeMap::new();
        for server in servers {
            if server.weight == 0 {
                return Err(RingError::InvalidWeight(server.name.clone()));
            }
            by_name.insert(&server.name, server.weight);
        }

        let servers: Vec<Server> = by_name
            .into_iter()
            .map(|(name, weight)| Server::new(name, weight))
            .collect();
        let total_weight: u64 = servers.iter().map(|s| u64::from(s.weight)).sum();
        let budget = self.points_per_server as u64 * servers.len() as u64;

        // Floors can undershoot the budget and the 1-point floor can
        // overshoot it, but never by more than one point per server.
        let mut points = Vec::with_capacity((budget as usize) + servers.len());
        let mut label = String::new();

        for (idx, server) in servers.iter().enumerate() {
            let target = ((budget * u64::from(server.weight)) / total_weight).max(1) as usize;

            let mut placed = 0;
            let mut round = 0u64;
            while placed < target {
                label.clear();
                write!(label, "{}-{}", server.name, round).expect("write to string");
                for hash in split_digest(&digest(label.as_bytes())) {
                    if placed == target {
                        break;
                    }
                    points.push(Point {
                        hash,
                        server: idx as u32,
                    });
                    placed += 1;
                }
                round += 1;
            }

            debug!(server = %server.name, weight = server.weight, points = target, "placed server on ring");
        }

        points.sort_unstable_by_key(|p| (p.hash, p.server));

        Ok(Ring {
            points,
            servers,
            total_weight,
        })
    }
}
