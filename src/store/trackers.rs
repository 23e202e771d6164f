//! The tracker definition file. All trackers live in a single JSON document
//! kept in creation order; it is small enough to rewrite on every change.

use super::{
    StoreDir, StoreError,
    entities::{Tracker, TrackerId},
    read_json_or, write_json,
};

impl StoreDir {
    pub(crate) async fn load_trackers(&self) -> Result<Vec<Tracker>, StoreError> {
        read_json_or(&self.trackers_path(), Vec::new).await
    }

    pub(crate) async fn save_trackers(&self, trackers: &[Tracker]) -> Result<(), StoreError> {
        write_json(&self.trackers_path(), &trackers).await
    }
}

/// Next free identifier. Ids grow past every id ever issued to a live
/// tracker, so deleting the newest tracker is the only way an id can be
/// reused.
pub(crate) fn next_tracker_id(trackers: &[Tracker]) -> TrackerId {
    TrackerId(
        trackers
            .iter()
            .map(|tracker| tracker.id.0)
            .max()
            .map_or(1, |max| max + 1),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::store::entities::WorkDays;

    use super::*;

    fn tracker(id: u64) -> Tracker {
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap();
        Tracker {
            id: TrackerId(id),
            name: format!("tracker {id}"),
            target_hours: 4.,
            work_days: WorkDays::weekdays(),
            archived: false,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn empty_store_has_no_trackers() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load_trackers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trackers_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let trackers = vec![tracker(1), tracker(2)];
        {
            let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
            store.save_trackers(&trackers).await.unwrap();
        }
        let store = StoreDir::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.load_trackers().await.unwrap(), trackers);
    }

    #[test]
    fn ids_grow_past_the_largest_issued() {
        assert_eq!(next_tracker_id(&[]), TrackerId(1));
        assert_eq!(next_tracker_id(&[tracker(1), tracker(4)]), TrackerId(5));
    }
}
