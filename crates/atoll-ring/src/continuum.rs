//! Concurrent continuum: published ring snapshot plus membership mutation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use atoll_types::Server;
use tracing::{debug, info};

use crate::builder::{ContinuumBuilder, Ring};
use crate::error::RingError;

/// Concurrent owner of the hash ring.
///
/// Lookups load the current [`Ring`] snapshot through an [`ArcSwap`]; this
/// is lock-free and wait-free, and a reader always observes either the
/// fully-old or the fully-new ring, never a mix. Mutating operations hold
/// the membership mutex across the whole rebuild-and-swap, serializing
/// writers; a rebuild that fails publishes nothing, so the previously valid
/// ring stays installed.
///
/// Every membership change rebuilds the entire ring: point counts for *all*
/// servers depend on the total weight, so there is no incremental edit.
pub struct Continuum {
    /// Authoritative server set, name → weight. Locked by every mutating
    /// operation for the whole rebuild-and-swap.
    members: Mutex<BTreeMap<String, u32>>,
    /// Published ring snapshot. Readers load it without locking.
    ring: ArcSwap<Ring>,
    builder: ContinuumBuilder,
}

impl Continuum {
    /// Create an empty continuum. Lookups fail with
    /// [`RingError::NoServersAvailable`] until a server is added.
    pub fn new() -> Self {
        Self::with_builder(ContinuumBuilder::new())
    }

    /// Create an empty continuum that rebuilds through the given builder.
    pub fn with_builder(builder: ContinuumBuilder) -> Self {
        Self {
            members: Mutex::new(BTreeMap::new()),
            ring: ArcSwap::from_pointee(Ring::empty()),
            builder,
        }
    }

    /// Build a continuum from an initial server set, which may be empty.
    pub fn with_servers(servers: impl IntoIterator<Item = Server>) -> Result<Self, RingError> {
        let mut desired = BTreeMap::new();
        for server in servers {
            if server.weight == 0 {
                return Err(RingError::InvalidWeight(server.name));
            }
            desired.insert(server.name, server.weight);
        }

        let builder = ContinuumBuilder::new();
        let ring = build_ring(&builder, &desired)?;
        Ok(Self {
            members: Mutex::new(desired),
            ring: ArcSwap::from_pointee(ring),
            builder,
        })
    }

    /// Insert a server, or update its weight if the name is already
    /// present, then rebuild and publish the ring.
    pub fn add_server(&self, name: &str, weight: u32) -> Result<(), RingError> {
        if weight == 0 {
            return Err(RingError::InvalidWeight(name.to_string()));
        }

        let mut members = self.members.lock().expect("members lock poisoned");
        let mut desired = members.clone();
        desired.insert(name.to_string(), weight);

        self.ring.store(Arc::new(build_ring(&self.builder, &desired)?));
        *members = desired;
        info!(server = name, weight, "server added to continuum");
        Ok(())
    }

    /// Remove a server from the set, then rebuild and publish the ring.
    ///
    /// Fails with [`RingError::UnknownServer`] if the name is absent.
    /// Removing the last server installs the empty ring.
    pub fn remove_server(&self, name: &str) -> Result<(), RingError> {
        let mut members = self.members.lock().expect("members lock poisoned");
        if !members.contains_key(name) {
            return Err(RingError::UnknownServer(name.to_string()));
        }
        let mut desired = members.clone();
        desired.remove(name);

        self.ring.store(Arc::new(build_ring(&self.builder, &desired)?));
        *members = desired;
        info!(server = name, "server removed from continuum");
        Ok(())
    }

    /// Replace the server set with the one described by `spec`, a
    /// comma-separated list of `name:weight` entries, e.g.
    /// `"node1:1000,node2:1000"`.
    ///
    /// When the desired set matches the current one exactly (same names and
    /// weights) the call is a no-op and the installed snapshot is kept, so
    /// every key mapping is preserved. Otherwise the whole set is replaced
    /// and the ring rebuilt. A malformed entry fails the whole call without
    /// touching anything.
    pub fn sync_servers(&self, spec: &str) -> Result<(), RingError> {
        let desired = parse_sync_spec(spec)?;

        let mut members = self.members.lock().expect("members lock poisoned");
        if *members == desired {
            debug!("sync matches current server set, keeping ring");
            return Ok(());
        }

        let added = desired.keys().filter(|n| !members.contains_key(*n)).count();
        let removed = members.keys().filter(|n| !desired.contains_key(*n)).count();

        self.ring.store(Arc::new(build_ring(&self.builder, &desired)?));
        *members = desired;
        info!(servers = members.len(), added, removed, "server set synced");
        Ok(())
    }

    /// Map a key to the server owning it on the current ring.
    pub fn get_server(&self, key: &[u8]) -> Result<Server, RingError> {
        self.ring.load().server_for(key).map(Server::clone)
    }

    /// Grab the current immutable ring snapshot.
    ///
    /// Callers doing many lookups can hold the snapshot and query it
    /// directly, pinning one consistent view across all of them.
    pub fn snapshot(&self) -> Arc<Ring> {
        self.ring.load_full()
    }

    /// Human-readable dump of the installed ring. Observability only; the
    /// format is not a stable contract.
    pub fn get_info(&self) -> String {
        self.ring.load().describe()
    }

    /// Snapshot of the current server set, sorted by name.
    pub fn servers(&self) -> Vec<Server> {
        self.members
            .lock()
            .expect("members lock poisoned")
            .iter()
            .map(|(name, weight)| Server::new(name.clone(), *weight))
            .collect()
    }

    /// Number of servers currently in the set.
    pub fn server_count(&self) -> usize {
        self.members.lock().expect("members lock poisoned").len()
    }
}

impl Default for Continuum {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Continuum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.load();
        f.debug_struct("Continuum")
            .field("servers", &ring.server_count())
            .field("points", &ring.point_count())
            .finish_non_exhaustive()
    }
}

/// Build a ring for the desired member table, mapping the empty table to
/// the empty ring rather than an error: a continuum may legitimately hold
/// zero servers.
fn build_ring(builder: &ContinuumBuilder, desired: &BTreeMap<String, u32>) -> Result<Ring, RingError> {
    if desired.is_empty() {
        return Ok(Ring::empty());
    }
    let servers: Vec<Server> = desired
        .iter()
        .map(|(name, weight)| Server::new(name.clone(), *weight))
        .collect();
    builder.build(&servers)
}

/// Parse a `name:weight,name:weight` sync specification into a member
/// table.
///
/// Server names are typically `host:port`, so the weight separator is the
/// *last* colon. The first bad entry fails the whole parse; no partial
/// table is ever returned.
fn parse_sync_spec(spec: &str) -> Result<BTreeMap<String, u32>, RingError> {
    let mut desired = BTreeMap::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        let Some((name, weight)) = entry.rsplit_once(':') else {
            return Err(RingError::MalformedSyncSpec(entry.to_string()));
        };
        if name.is_empty() {
            return Err(RingError::MalformedSyncSpec(entry.to_string()));
        }
        let weight: u32 = weight
            .trim()
            .parse()
            .map_err(|_| RingError::MalformedSyncSpec(entry.to_string()))?;
        if weight == 0 {
            return Err(RingError::InvalidWeight(name.to_string()));
        }
        desired.insert(name.to_string(), weight);
    }
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn four_node_continuum() -> Continuum {
        Continuum::with_servers((1..=4).map(|i| Server::new(format!("node{i}"), 1000))).unwrap()
    }

    fn mapping(continuum: &Continuum, keys: usize) -> Vec<String> {
        let ring = continuum.snapshot();
        (0..keys)
            .map(|i| ring.server_for(format!("key{i}").as_bytes()).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_empty_continuum_rejects_lookup() {
        let continuum = Continuum::new();
        assert_eq!(continuum.server_count(), 0);
        assert!(matches!(
            continuum.get_server(b"key").unwrap_err(),
            RingError::NoServersAvailable
        ));
    }

    #[test]
    fn test_with_servers_accepts_empty_set() {
        let continuum = Continuum::with_servers(Vec::<Server>::new()).unwrap();
        assert!(continuum.snapshot().is_empty());
    }

    #[test]
    fn test_with_servers_rejects_zero_weight() {
        let err = Continuum::with_servers([Server::new("alpha", 0)]).unwrap_err();
        assert!(matches!(err, RingError::InvalidWeight(name) if name == "alpha"));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let continuum = four_node_continuum();
        let first = continuum.get_server(b"some key").unwrap();
        for _ in 0..50 {
            assert_eq!(continuum.get_server(b"some key").unwrap(), first);
        }

        // An independently built continuum agrees on every mapping.
        let other = four_node_continuum();
        assert_eq!(mapping(&continuum, 500), mapping(&other, 500));
    }

    #[test]
    fn test_add_server_inserts_and_rebuilds() {
        let continuum = Continuum::new();
        continuum.add_server("alpha", 1).unwrap();
        assert_eq!(continuum.get_server(b"anything").unwrap().name, "alpha");

        continuum.add_server("beta", 1).unwrap();
        assert_eq!(continuum.server_count(), 2);
        assert_eq!(continuum.snapshot().point_count(), 320);
    }

    #[test]
    fn test_add_existing_server_updates_weight() {
        let continuum = Continuum::with_servers([Server::new("alpha", 1), Server::new("beta", 1)])
            .unwrap();
        continuum.add_server("beta", 3).unwrap();

        assert_eq!(continuum.server_count(), 2);
        let servers = continuum.servers();
        assert_eq!(servers, vec![Server::new("alpha", 1), Server::new("beta", 3)]);

        // 80/240 split for weights 1:3.
        let ring = continuum.snapshot();
        let beta_idx = ring.servers().iter().position(|s| s.name == "beta").unwrap() as u32;
        let beta_points = ring.points().iter().filter(|p| p.server == beta_idx).count();
        assert_eq!(beta_points, 240);
    }

    #[test]
    fn test_add_server_zero_weight_rejected_before_any_change() {
        let continuum = four_node_continuum();
        let before = continuum.snapshot();

        let err = continuum.add_server("node5", 0).unwrap_err();
        assert!(matches!(err, RingError::InvalidWeight(_)));
        assert_eq!(continuum.server_count(), 4);
        assert!(Arc::ptr_eq(&before, &continuum.snapshot()));
    }

    #[test]
    fn test_remove_unknown_server_fails() {
        let continuum = four_node_continuum();
        let err = continuum.remove_server("node9").unwrap_err();
        assert!(matches!(err, RingError::UnknownServer(name) if name == "node9"));
        assert_eq!(continuum.server_count(), 4);
    }

    #[test]
    fn test_remove_last_server_leaves_empty_ring() {
        let continuum = Continuum::with_servers([Server::new("solo", 1)]).unwrap();
        continuum.remove_server("solo").unwrap();
        assert_eq!(continuum.server_count(), 0);
        assert!(matches!(
            continuum.get_server(b"key").unwrap_err(),
            RingError::NoServersAvailable
        ));
    }

    #[test]
    fn test_removal_only_remaps_keys_of_removed_server() {
        let continuum = four_node_continuum();
        let before = mapping(&continuum, 10_000);

        continuum.remove_server("node2").unwrap();
        let after = mapping(&continuum, 10_000);

        let mut moved = 0;
        for (b, a) in before.iter().zip(&after) {
            if b == "node2" {
                assert_ne!(a, "node2");
                moved += 1;
            } else {
                assert_eq!(b, a, "key not owned by removed server must not move");
            }
        }
        // The removed server held a quarter of the keys, give or take.
        assert!(moved > 1_500 && moved < 3_500, "moved {moved} of 10000");
    }

    #[test]
    fn test_weight_proportionality_four_equal_servers() {
        let continuum = four_node_continuum();
        let ring = continuum.snapshot();

        let mut counts: HashMap<String, usize> = HashMap::new();
        let total = 100_000;
        for i in 0..total {
            let server = ring.server_for(format!("key{i}").as_bytes()).unwrap();
            *counts.entry(server.name.clone()).or_default() += 1;
        }

        // Each server should see ~25% of keys, within 5 percentage points.
        for i in 1..=4 {
            let share = counts[&format!("node{i}")] as f64 / total as f64;
            assert!(
                (0.20..=0.30).contains(&share),
                "node{i} received {:.1}% of keys",
                share * 100.0
            );
        }
    }

    #[test]
    fn test_weighted_server_draws_proportional_keys() {
        let continuum =
            Continuum::with_servers([Server::new("a", 1), Server::new("b", 3)]).unwrap();
        let ring = continuum.snapshot();

        let total = 40_000;
        let mut b_count = 0usize;
        for i in 0..total {
            if ring.server_for(format!("k{i}").as_bytes()).unwrap().name == "b" {
                b_count += 1;
            }
        }

        // b holds 3/4 of the weight; allow a generous band around 75%.
        let share = b_count as f64 / total as f64;
        assert!(
            (0.65..=0.85).contains(&share),
            "b received {:.1}% of keys",
            share * 100.0
        );
    }

    #[test]
    fn test_example_scenario_two_servers_hundred_keys() {
        let continuum =
            Continuum::with_servers([Server::new("alpha", 1), Server::new("beta", 1)]).unwrap();
        let ring = continuum.snapshot();

        let mut alpha = 0usize;
        for i in 0..100 {
            if ring.server_for(format!("foo{i}").as_bytes()).unwrap().name == "alpha" {
                alpha += 1;
            }
        }
        assert!(
            (40..=60).contains(&alpha),
            "alpha received {alpha} of 100 keys"
        );
    }

    #[test]
    fn test_wrap_around_key() {
        // hash32("wrap89") lands past the highest point of the alpha/beta
        // ring, so it wraps to the first point, which alpha owns.
        let continuum =
            Continuum::with_servers([Server::new("alpha", 1), Server::new("beta", 1)]).unwrap();
        let ring = continuum.snapshot();
        assert!(crate::hash::hash32(b"wrap89") > ring.points().last().unwrap().hash);
        assert_eq!(continuum.get_server(b"wrap89").unwrap().name, "alpha");
    }

    #[test]
    fn test_sync_servers_replaces_set() {
        let continuum = four_node_continuum();
        continuum
            .sync_servers("node1:1000,node5:500")
            .unwrap();

        assert_eq!(
            continuum.servers(),
            vec![Server::new("node1", 1000), Server::new("node5", 500)]
        );
    }

    #[test]
    fn test_sync_identical_set_is_noop() {
        let continuum = four_node_continuum();
        let before = continuum.snapshot();

        continuum
            .sync_servers("node1:1000,node2:1000,node3:1000,node4:1000")
            .unwrap();

        // Same snapshot object: no rebuild happened, every mapping is
        // byte-for-byte preserved.
        assert!(Arc::ptr_eq(&before, &continuum.snapshot()));
    }

    #[test]
    fn test_sync_same_names_new_weight_rebuilds() {
        let continuum = four_node_continuum();
        let before = continuum.snapshot();

        continuum
            .sync_servers("node1:2000,node2:1000,node3:1000,node4:1000")
            .unwrap();

        assert!(!Arc::ptr_eq(&before, &continuum.snapshot()));
        assert_eq!(continuum.servers()[0], Server::new("node1", 2000));
    }

    #[test]
    fn test_sync_entry_order_does_not_matter() {
        let continuum = four_node_continuum();
        let before = continuum.snapshot();
        continuum
            .sync_servers("node4:1000,node3:1000,node2:1000,node1:1000")
            .unwrap();
        assert!(Arc::ptr_eq(&before, &continuum.snapshot()));
    }

    #[test]
    fn test_malformed_sync_leaves_state_untouched() {
        let continuum = four_node_continuum();
        let before = continuum.snapshot();

        for spec in ["node1", "node1:abc", ":1000", "node1:1000,,node2:1000"] {
            let err = continuum.sync_servers(spec).unwrap_err();
            assert!(matches!(err, RingError::MalformedSyncSpec(_)), "spec {spec:?}");
        }

        let err = continuum.sync_servers("node1:0").unwrap_err();
        assert!(matches!(err, RingError::InvalidWeight(name) if name == "node1"));

        assert_eq!(continuum.server_count(), 4);
        assert!(Arc::ptr_eq(&before, &continuum.snapshot()));
    }

    #[test]
    fn test_sync_names_with_colons() {
        let continuum = Continuum::new();
        continuum
            .sync_servers("10.0.1.1:11211:600,10.0.1.2:11211:300")
            .unwrap();
        assert_eq!(
            continuum.servers(),
            vec![
                Server::new("10.0.1.1:11211", 600),
                Server::new("10.0.1.2:11211", 300),
            ]
        );
    }

    #[test]
    fn test_sync_tolerates_whitespace_between_entries() {
        let continuum = Continuum::new();
        continuum.sync_servers("alpha:1, beta:2").unwrap();
        assert_eq!(continuum.server_count(), 2);
    }

    #[test]
    fn test_snapshot_pins_view_across_mutation() {
        let continuum = four_node_continuum();
        let pinned = continuum.snapshot();
        let owner_before = pinned.server_for(b"stable key").unwrap().clone();

        continuum.remove_server("node1").unwrap();
        continuum.remove_server("node2").unwrap();

        // The pinned snapshot still answers from the old view.
        assert_eq!(*pinned.server_for(b"stable key").unwrap(), owner_before);
        assert_eq!(pinned.server_count(), 4);
        assert_eq!(continuum.snapshot().server_count(), 2);
    }

    #[test]
    fn test_concurrent_lookups_during_rebuilds() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let continuum = Arc::new(four_node_continuum());
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|t| {
                let continuum = continuum.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    let mut i = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        // Every lookup sees a complete ring: it either
                        // resolves or the set was legitimately empty.
                        let key = format!("t{t}-{i}");
                        let _ = continuum.get_server(key.as_bytes());
                        i += 1;
                    }
                })
            })
            .collect();

        for round in 0..50 {
            continuum.add_server(&format!("extra{round}"), 100).unwrap();
            continuum.remove_server(&format!("extra{round}")).unwrap();
        }

        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(continuum.server_count(), 4);
    }

    #[test]
    fn test_get_info_reflects_membership() {
        let continuum = Continuum::new();
        assert!(continuum.get_info().contains("empty"));

        continuum.add_server("alpha", 1).unwrap();
        continuum.add_server("beta", 1).unwrap();
        let info = continuum.get_info();
        assert!(info.contains("2 servers"));
        assert!(info.contains("alpha"));
    }
}
