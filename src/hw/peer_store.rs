use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use super::model::PeripheralIdentity;
use crate::error::InteractionError;

const PEER_FILE_NAME: &str = "last-peer.json";

/// Single-slot store for the last peripheral a connection was attempted to.
///
/// Only the address and advertised name are persisted.
#[derive(Debug, Default)]
pub struct PeerStore {
    path: Option<PathBuf>,
    last: Option<PeripheralIdentity>,
}

impl PeerStore {
    /// Creates a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the store from a custom path, or from the platform state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, InteractionError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_peer_path);
        Self::load_from_path(path)
    }

    /// Loads the store backed by a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_from_path(path: PathBuf) -> Result<Self, InteractionError> {
        let last = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|source| InteractionError::PeerStoreIo { source })?;
            parse_record(&raw)?
        } else {
            None
        };
        debug!(path = %path.display(), remembered = last.is_some(), "loaded peer store");
        Ok(Self {
            path: Some(path),
            last,
        })
    }

    /// Returns the remembered peer, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PeripheralIdentity> {
        self.last.as_ref()
    }

    /// Overwrites the remembered peer and persists it.
    ///
    /// The in-memory slot is updated even when writing the file fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be written.
    pub fn remember(&mut self, identity: &PeripheralIdentity) -> Result<(), InteractionError> {
        self.last = Some(PeripheralIdentity::new(
            identity.address(),
            identity.name().map(ToString::to_string),
        ));
        self.save()
    }

    fn save(&self) -> Result<(), InteractionError> {
        let (Some(path), Some(last)) = (&self.path, &self.last) else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| InteractionError::PeerStoreIo { source })?;
        }
        let serialised =
            serde_json::to_string_pretty(last).map_err(|error| InteractionError::PeerStoreIo {
                source: std::io::Error::other(error),
            })?;
        fs::write(path, serialised).map_err(|source| InteractionError::PeerStoreIo { source })
    }
}

fn parse_record(contents: &str) -> Result<Option<PeripheralIdentity>, InteractionError> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let identity: PeripheralIdentity =
        serde_json::from_str(trimmed).map_err(|_error| InteractionError::InvalidPeerRecord {
            record: trimmed.to_string(),
        })?;
    if identity.address().is_empty() {
        return Err(InteractionError::InvalidPeerRecord {
            record: trimmed.to_string(),
        });
    }
    Ok(Some(identity))
}

fn default_peer_path() -> PathBuf {
    let project_dirs = ProjectDirs::from("org", "Dronelink", "dronelink");
    let Some(project_dirs) = project_dirs else {
        return std::env::temp_dir().join("dronelink").join(PEER_FILE_NAME);
    };

    let root = project_dirs
        .state_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dirs.data_local_dir().to_path_buf());
    root.join(PEER_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn unique_temp_path(file_name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("dronelink-{file_name}-{suffix}.json"))
    }

    fn remove_if_exists(path: &Path) {
        if path.exists() {
            fs::remove_file(path).expect("temporary fixture file should be removable");
        }
    }

    #[test]
    fn store_round_trips_remembered_peer() {
        let path = unique_temp_path("peer-store");
        remove_if_exists(&path);

        let mut store = PeerStore::load_from_path(path.clone()).expect("new store should load");
        assert_eq!(None, store.last());

        let identity = PeripheralIdentity::new("AA:BB:CC", Some("Drone-1".to_string()))
            .with_rssi(Some(-50));
        store.remember(&identity).expect("remember should persist");

        let reloaded = PeerStore::load_from_path(path.clone()).expect("store should reload");
        let last = reloaded.last().expect("peer should be remembered");
        assert_eq!("AA:BB:CC", last.address());
        assert_eq!(Some("Drone-1"), last.name());
        assert_eq!(None, last.rssi());

        remove_if_exists(&path);
    }

    #[test]
    fn remember_overwrites_previous_peer() {
        let mut store = PeerStore::in_memory();
        store
            .remember(&PeripheralIdentity::new("AA", None))
            .expect("in-memory remember should succeed");
        store
            .remember(&PeripheralIdentity::new("BB", None))
            .expect("in-memory remember should succeed");

        assert_eq!(Some("BB"), store.last().map(PeripheralIdentity::address));
    }

    #[test]
    fn load_rejects_malformed_record() {
        let path = unique_temp_path("peer-store-invalid");
        fs::write(&path, "not json").expect("fixture should be writable");

        let result = PeerStore::load_from_path(path.clone());

        assert_matches!(result, Err(InteractionError::InvalidPeerRecord { .. }));
        remove_if_exists(&path);
    }

    #[test]
    fn empty_file_means_no_peer() {
        let path = unique_temp_path("peer-store-empty");
        fs::write(&path, "\n").expect("fixture should be writable");

        let store = PeerStore::load_from_path(path.clone()).expect("empty store should load");

        assert_eq!(None, store.last());
        remove_if_exists(&path);
    }
}
