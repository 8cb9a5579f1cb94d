// SPDX-License-Identifier: GPL-3.0-only

//! Camera presence ledger
//!
//! Tracks which camera identifiers the platform currently reports present.
//! Mutated only by hot-plug events. It knows nothing about sessions; the
//! lifecycle manager reconciles the two.

use crate::backends::camera::types::{CameraId, PresenceEvent, PresenceSet};
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Set of cameras currently present
#[derive(Debug, Default)]
pub struct CameraRegistry {
    present: RwLock<BTreeSet<CameraId>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a camera appeared
    ///
    /// Returns the change event, or `None` if the camera was already present.
    pub fn add(&self, id: &CameraId) -> Option<PresenceEvent> {
        let inserted = self
            .present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());

        if inserted {
            debug!(camera = %id, "Camera present");
            Some(PresenceEvent::added(id.clone()))
        } else {
            debug!(camera = %id, "Camera already present");
            None
        }
    }

    /// Record that a camera disappeared
    ///
    /// Returns the change event, or `None` if the camera was already absent.
    pub fn remove(&self, id: &CameraId) -> Option<PresenceEvent> {
        let removed = self
            .present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        if removed {
            debug!(camera = %id, "Camera absent");
            Some(PresenceEvent::removed(id.clone()))
        } else {
            debug!(camera = %id, "Camera already absent");
            None
        }
    }

    pub fn contains(&self, id: &CameraId) -> bool {
        self.present
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn snapshot(&self) -> PresenceSet {
        self.present
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into()
    }

    pub fn len(&self) -> usize {
        self.present
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PresenceChange;

    #[test]
    fn test_add_reports_change_once() {
        let registry = CameraRegistry::new();
        let id = CameraId::from("0");

        let event = registry.add(&id).unwrap();
        assert_eq!(event.change, PresenceChange::Added);
        assert_eq!(event.camera_id, id);
        assert!(registry.add(&id).is_none());
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_reports_change_once() {
        let registry = CameraRegistry::new();
        let id = CameraId::from("0");
        registry.add(&id);

        assert_eq!(
            registry.remove(&id).map(|e| e.change),
            Some(PresenceChange::Removed)
        );
        assert!(registry.remove(&id).is_none());
        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_of_unknown_camera_is_noop() {
        let registry = CameraRegistry::new();
        assert!(registry.remove(&CameraId::from("7")).is_none());
    }

    #[test]
    fn test_membership_follows_latest_event() {
        let registry = CameraRegistry::new();
        let id = CameraId::from("1");

        registry.add(&id);
        registry.remove(&id);
        registry.add(&id);
        assert!(registry.contains(&id));

        let snapshot = registry.snapshot();
        registry.remove(&id);
        // Snapshots are detached from later changes
        assert!(snapshot.contains(&id));
        assert!(!registry.snapshot().contains(&id));
    }
}
