//! Loading weighted server lists from directory files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use atoll_types::Server;
use tracing::debug;

use crate::error::DirectoryError;

/// Reads server `<name> <weight>` pairs from a file and remembers the
/// file's modification time so callers can cheaply poll for changes.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// fails the whole load; no partial list is returned.
#[derive(Debug)]
pub struct ServerDirectory {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl ServerDirectory {
    /// Create a directory reader for `path`. No I/O happens until
    /// [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
        }
    }

    /// Read and parse the directory file, recording its modification time.
    pub fn load(&mut self) -> Result<Vec<Server>, DirectoryError> {
        let content = fs::read_to_string(&self.path)?;
        self.modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();

        let servers = parse(&content)?;
        debug!(path = %self.path.display(), servers = servers.len(), "directory loaded");
        Ok(servers)
    }

    /// Whether the file has been modified since the last successful
    /// [`load`](Self::load).
    ///
    /// Errs on the side of `true`: before any load, or when the
    /// modification time cannot be read, the caller should reload.
    pub fn has_changed(&self) -> bool {
        let Some(last) = self.modified else {
            return true;
        };
        match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(now) => now > last,
            Err(_) => true,
        }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Render servers as the comma-separated `name:weight` list accepted by a
/// continuum's `sync_servers`.
pub fn sync_spec(servers: &[Server]) -> String {
    servers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse directory file content into servers.
fn parse(content: &str) -> Result<Vec<Server>, DirectoryError> {
    let mut servers = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = || DirectoryError::MalformedLine {
            line: idx + 1,
            content: raw.to_string(),
        };

        let mut fields = line.split_whitespace();
        let (Some(name), Some(weight), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };
        let weight: u32 = weight.parse().map_err(|_| malformed())?;
        if weight == 0 {
            return Err(malformed());
        }

        servers.push(Server::new(name, weight));
    }

    Ok(servers)
}
