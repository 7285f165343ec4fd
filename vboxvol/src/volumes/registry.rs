//! In-memory record of the volumes this process has allocated.

use std::collections::HashMap;
use std::path::PathBuf;

use vboxvol_shared::errors::{VolumeError, VolumeResult};

use crate::hypervisor::DiskHandle;

/// A named, driver-managed disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    /// Host path of the backing image.
    pub storage_location: PathBuf,
    pub disk: DiskHandle,
}

/// Map from volume name to its allocated disk.
///
/// Passive: it has no locking of its own. [`VolumeDriver`](super::VolumeDriver)
/// keeps it behind a short-held lock and only mutates it while also holding
/// the lock that serializes Create and Remove.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: HashMap<String, Volume>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `volume`, returning the entry it replaced, if any.
    pub fn insert(&mut self, volume: Volume) -> Option<Volume> {
        self.volumes.insert(volume.name.clone(), volume)
    }

    /// Drop the entry for `name`. Absence is not an error.
    pub fn remove(&mut self, name: &str) -> Option<Volume> {
        self.volumes.remove(name)
    }

    pub fn lookup(&self, name: &str) -> VolumeResult<&Volume> {
        self.volumes
            .get(name)
            .ok_or_else(|| VolumeError::NotFound(format!("volume {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::ObjectRef;

    fn volume(name: &str, disk: &str) -> Volume {
        Volume {
            name: name.to_string(),
            storage_location: PathBuf::from(format!("/data/{}.vmdk", name)),
            disk: DiskHandle(ObjectRef::new(disk)),
        }
    }

    #[test]
    fn test_insert_lookup_remove() {
        let mut registry = VolumeRegistry::new();
        assert!(registry.insert(volume("v1", "medium-1")).is_none());

        let found = registry.lookup("v1").unwrap();
        assert_eq!(found.disk, DiskHandle(ObjectRef::new("medium-1")));
        assert_eq!(registry.len(), 1);

        let removed = registry.remove("v1").unwrap();
        assert_eq!(removed.name, "v1");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut registry = VolumeRegistry::new();
        registry.insert(volume("v1", "medium-1"));

        let replaced = registry.insert(volume("v1", "medium-2")).unwrap();
        assert_eq!(replaced.disk, DiskHandle(ObjectRef::new("medium-1")));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("v1").unwrap().disk,
            DiskHandle(ObjectRef::new("medium-2"))
        );
    }

    #[test]
    fn test_missing_entries() {
        let mut registry = VolumeRegistry::new();
        assert!(registry.remove("ghost").is_none());
        assert!(matches!(
            registry.lookup("ghost"),
            Err(VolumeError::NotFound(_))
        ));
    }
}
