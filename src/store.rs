use crate::errors::{AppError, AppResult};
use crate::models::{Notification, Request};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Document store holding requests keyed by id, plus the stored notifications.
///
/// Partial updates take a JSON object that is merged into the stored
/// document. Implementations leave the `id` and `createdAt` fields of a
/// request untouched.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: &str) -> AppResult<Option<Request>>;
    fn get_all(&self) -> AppResult<BTreeMap<String, Request>>;
    fn put(&self, id: &str, request: &Request) -> AppResult<()>;
    fn update(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Request>>;
    fn delete(&self, id: &str) -> AppResult<bool>;

    fn get_all_notifications(&self) -> AppResult<Vec<Notification>>;
    fn put_notifications(&self, batch: &[Notification]) -> AppResult<()>;
    fn update_notification(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Notification>>;
    fn delete_notification(&self, id: &str) -> AppResult<bool>;
}

pub(crate) const IMMUTABLE_REQUEST_FIELDS: [&str; 2] = ["id", "createdAt"];

pub(crate) fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

pub(crate) fn strip_fields(mut fields: serde_json::Value, names: &[&str]) -> AppResult<serde_json::Value> {
    let Some(object) = fields.as_object_mut() else {
        return Err(AppError::Validation("update fields must be a JSON object".to_string()));
    };
    for name in names {
        object.remove(*name);
    }
    Ok(fields)
}

/// Applies a partial JSON update to a typed document.
pub(crate) fn patch_document<T>(current: &T, fields: serde_json::Value, protected: &[&str]) -> AppResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let fields = strip_fields(fields, protected)?;
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, fields);
    serde_json::from_value(merged).map_err(|error| AppError::Validation(error.to_string()))
}

#[derive(Debug, Default)]
struct MemoryState {
    requests: BTreeMap<String, Request>,
    notifications: HashMap<String, Notification>,
}

/// Process-local store, used when no persistent backend is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &str) -> AppResult<Option<Request>> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    fn get_all(&self) -> AppResult<BTreeMap<String, Request>> {
        Ok(self.lock()?.requests.clone())
    }

    fn put(&self, id: &str, request: &Request) -> AppResult<()> {
        self.lock()?.requests.insert(id.to_string(), request.clone());
        Ok(())
    }

    fn update(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Request>> {
        let mut state = self.lock()?;
        let Some(current) = state.requests.get(id) else {
            return Ok(None);
        };
        let updated: Request = patch_document(current, fields, &IMMUTABLE_REQUEST_FIELDS)?;
        state.requests.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.lock()?.requests.remove(id).is_some())
    }

    fn get_all_notifications(&self) -> AppResult<Vec<Notification>> {
        Ok(self.lock()?.notifications.values().cloned().collect())
    }

    fn put_notifications(&self, batch: &[Notification]) -> AppResult<()> {
        let mut state = self.lock()?;
        for notification in batch {
            state
                .notifications
                .insert(notification.id.clone(), notification.clone());
        }
        Ok(())
    }

    fn update_notification(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Notification>> {
        let mut state = self.lock()?;
        let Some(current) = state.notifications.get(id) else {
            return Ok(None);
        };
        let updated: Notification = patch_document(current, fields, &["id"])?;
        state.notifications.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    fn delete_notification(&self, id: &str) -> AppResult<bool> {
        Ok(self.lock()?.notifications.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_json, MemoryStore, RecordStore};
    use crate::models::{Request, RequestStatus};
    use chrono::{TimeZone, Utc};

    fn sample_request(id: &str) -> Request {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Request {
            id: id.to_string(),
            manual_id: None,
            title: "School supplies".to_string(),
            details: String::new(),
            receiving_authority: "Ministry of Education".to_string(),
            submission_date: None,
            status: RequestStatus::Pending,
            documents: vec!["letter.pdf".to_string()],
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
    fn merge_json_overwrites_scalars_and_recurses_into_objects() {
        let mut target = serde_json::json!({ "a": 1, "nested": { "x": 1, "y": 2 } });
        merge_json(&mut target, serde_json::json!({ "a": 2, "nested": { "y": 3 } }));
        assert_eq!(target, serde_json::json!({ "a": 2, "nested": { "x": 1, "y": 3 } }));
    }

    #[test]
    fn partial_update_keeps_id_and_created_at() {
        let store = MemoryStore::new();
        let request = sample_request("req-a");
        store.put(&request.id, &request).expect("put");

        let updated = store
            .update(
                "req-a",
                serde_json::json!({
                    "id": "hijacked",
                    "createdAt": "2030-01-01T00:00:00Z",
                    "status": "completed",
                }),
            )
            .expect("update")
            .expect("request exists");

        assert_eq!(updated.id, "req-a");
        assert_eq!(updated.created_at, request.created_at);
        assert_eq!(updated.status, RequestStatus::Completed);
        assert_eq!(updated.documents, request.documents);
    }

    #[test]
    fn update_of_missing_request_returns_none() {
        let store = MemoryStore::new();
        let result = store
            .update("missing", serde_json::json!({ "title": "x" }))
            .expect("update");
        assert!(result.is_none());
    }

    #[test]
    fn invalid_patch_is_a_validation_error() {
        let store = MemoryStore::new();
        let request = sample_request("req-b");
        store.put(&request.id, &request).expect("put");
        let err = store
            .update("req-b", serde_json::json!({ "status": "nonsense" }))
            .expect_err("invalid status");
        assert!(err.to_string().starts_with("VALIDATION"));
        assert!(store.update("req-b", serde_json::json!("not an object")).is_err());
    }
}
