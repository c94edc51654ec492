//! Volume and snapshot ID codec. A volume ID is `<backendName>.<volumeName>`;
//! a snapshot ID is `<backendName>.<parentVolume>.<snapshotName>`. The
//! router parses these before any cache lookup so the backend name is
//! known without touching the plugin.

use std::fmt;
use std::str::FromStr;

use crate::error::RouterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeId {
    pub backend: String,
    pub volume: String,
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.backend, self.volume)
    }
}

impl FromStr for VolumeId {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, volume) = s.split_once('.').ok_or_else(|| RouterError::MalformedVolumeId(s.to_owned()))?;
        if backend.is_empty() || volume.is_empty() {
            return Err(RouterError::MalformedVolumeId(s.to_owned()));
        }
        Ok(Self { backend: backend.to_owned(), volume: volume.to_owned() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotId {
    pub backend: String,
    pub parent_volume: String,
    pub snapshot: String,
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.backend, self.parent_volume, self.snapshot)
    }
}

impl FromStr for SnapshotId {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let backend = parts.next().filter(|p| !p.is_empty());
        let parent_volume = parts.next().filter(|p| !p.is_empty());
        let snapshot = parts.next().filter(|p| !p.is_empty());
        match (backend, parent_volume, snapshot) {
            (Some(backend), Some(parent_volume), Some(snapshot)) => Ok(Self {
                backend: backend.to_owned(),
                parent_volume: parent_volume.to_owned(),
                snapshot: snapshot.to_owned(),
            }),
            _ => Err(RouterError::MalformedSnapshotId(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_round_trips() {
        let id: VolumeId = "sanA.vol-1".parse().unwrap();
        assert_eq!(id.backend, "sanA");
        assert_eq!(id.volume, "vol-1");
        assert_eq!(id.to_string(), "sanA.vol-1");
    }

    #[test]
    fn volume_id_rejects_missing_separator() {
        assert!("sanA".parse::<VolumeId>().is_err());
    }

    #[test]
    fn snapshot_id_round_trips() {
        let id: SnapshotId = "sanA.vol-1.snap-1".parse().unwrap();
        assert_eq!(id.backend, "sanA");
        assert_eq!(id.parent_volume, "vol-1");
        assert_eq!(id.snapshot, "snap-1");
        assert_eq!(id.to_string(), "sanA.vol-1.snap-1");
    }

    #[test]
    fn snapshot_id_rejects_too_few_parts() {
        assert!("sanA.vol-1".parse::<SnapshotId>().is_err());
    }

    #[test]
    fn snapshot_id_allows_dots_inside_snapshot_name() {
        let id: SnapshotId = "sanA.vol-1.snap.with.dots".parse().unwrap();
        assert_eq!(id.snapshot, "snap.with.dots");
    }
}
