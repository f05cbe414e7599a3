use super::{lock, ImageLocator};
use crate::error::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Volume made of the frames of a single registered object.
    pub fn for_locator(locator: &ImageLocator) -> Self {
        Self(format!("volume:{locator}"))
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which images make up each volume. Frames are decoded on demand by the
/// volume viewport, so this stays small.
#[derive(Clone, Default)]
pub struct VolumeCache {
    volumes: Arc<Mutex<HashMap<VolumeId, Vec<ImageLocator>>>>,
}

impl VolumeCache {
    pub fn create_and_cache_volume(&self, volume_id: VolumeId, locators: Vec<ImageLocator>) {
        lock(&self.volumes).insert(volume_id, locators);
    }

    pub fn locators(&self, volume_id: &VolumeId) -> Result<Vec<ImageLocator>, EngineError> {
        lock(&self.volumes)
            .get(volume_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVolume(volume_id.to_string()))
    }

    pub fn remove(&self, volume_id: &VolumeId) {
        lock(&self.volumes).remove(volume_id);
    }

    pub fn purge(&self) {
        lock(&self.volumes).clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        lock(&self.volumes).is_empty()
    }
}
