use crate::errors::{AppError, AppResult};
use crate::models::{Notification, Request};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requests: BTreeMap<String, Request>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Last-known-good copy of the store contents, served while the store is
/// unreachable. Writes are read-modify-write on one file, so they hold
/// `write_lock` and land through a rename.
#[derive(Debug)]
pub struct SnapshotCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn load(&self) -> AppResult<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_json_file(&self.path).map(Some)
    }

    pub fn store_requests(&self, requests: &BTreeMap<String, Request>) -> AppResult<()> {
        let _guard = self.lock();
        let mut snapshot = self.load_or_default();
        snapshot.requests = requests.clone();
        snapshot.saved_at = Some(Utc::now());
        write_json_file(&self.path, &snapshot)
    }

    pub fn store_notifications(&self, notifications: &[Notification]) -> AppResult<()> {
        let _guard = self.lock();
        let mut snapshot = self.load_or_default();
        snapshot.notifications = notifications.to_vec();
        snapshot.saved_at = Some(Utc::now());
        write_json_file(&self.path, &snapshot)
    }

    fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::default(),
            Err(error) => {
                tracing::warn!(path = %self.path.to_string_lossy(), error = %error, "discarding unreadable snapshot");
                Snapshot::default()
            }
        }
    }
}

pub(crate) fn write_json_file<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, bytes).map_err(|error| AppError::Io(error.to_string()))?;
    fs::rename(&staging, path).map_err(|error| AppError::Io(error.to_string()))
}

pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path).map_err(|error| AppError::Io(error.to_string()))?;
    serde_json::from_slice(&bytes).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::SnapshotCache;
    use crate::models::{Notification, NotificationType, Priority, Request, RequestStatus};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn request(id: &str) -> Request {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Request {
            id: id.to_string(),
            manual_id: None,
            title: "Water supply".to_string(),
            details: String::new(),
            receiving_authority: "Ministry of Water".to_string(),
            submission_date: None,
            status: RequestStatus::Pending,
            documents: Vec::new(),
            response_status: false,
            response_date: None,
            response_details: None,
            implementation_date: None,
            followup_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = SnapshotCache::new(dir.path().join("snapshot.json"));
        assert!(cache.load().expect("load").is_none());
    }

    #[test]
    fn requests_and_notifications_are_kept_independently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = SnapshotCache::new(dir.path().join("nested").join("snapshot.json"));

        let mut requests = BTreeMap::new();
        requests.insert("req-1".to_string(), request("req-1"));
        cache.store_requests(&requests).expect("store requests");
        cache.store_notifications(&[]).expect("store notifications");

        let snapshot = cache.load().expect("load").expect("snapshot present");
        assert_eq!(snapshot.requests.len(), 1);
        assert!(snapshot.notifications.is_empty());
        assert!(snapshot.saved_at.is_some());
    }

    #[test]
    fn corrupt_snapshot_is_replaced_on_next_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"{not json").expect("write corrupt");
        let cache = SnapshotCache::new(path);
        assert!(cache.load().is_err());

        cache.store_requests(&BTreeMap::new()).expect("store");
        assert!(cache.load().expect("load").is_some());
    }

    #[test]
    fn concurrent_request_and_notification_writes_keep_both_halves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(SnapshotCache::new(dir.path().join("snapshot.json")));

        let mut requests = BTreeMap::new();
        requests.insert("req-1".to_string(), request("req-1"));
        let notifications = vec![Notification {
            id: "delayedResponse-req-1-1".to_string(),
            r#type: NotificationType::Delayed,
            title: "Delayed response".to_string(),
            message: "m".to_string(),
            request_id: "req-1".to_string(),
            priority: Priority::High,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap(),
            read: false,
        }];

        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    cache.store_requests(&requests).expect("store requests");
                }
            })
        };
        for _ in 0..50 {
            cache.store_notifications(&notifications).expect("store notifications");
            assert!(cache.load().expect("readable while writing").is_some());
        }
        writer.join().expect("writer thread");

        let snapshot = cache.load().expect("load").expect("snapshot present");
        assert_eq!(snapshot.requests.len(), 1);
        assert_eq!(snapshot.notifications.len(), 1);
        assert!(!dir.path().join("snapshot.json.tmp").exists());
    }
}
