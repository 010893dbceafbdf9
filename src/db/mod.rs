use crate::errors::{AppError, AppResult};
use crate::models::{Notification, Request};
use crate::store::{patch_document, RecordStore, IMMUTABLE_REQUEST_FIELDS};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite-backed document store. Each request and notification is kept as a
/// JSON document; the extra columns only serve ordering and lookups.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    fn write_request(conn: &Connection, id: &str, request: &Request) -> AppResult<()> {
        conn.execute(
            "INSERT INTO requests (id, doc_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               doc_json = excluded.doc_json,
               created_at = excluded.created_at,
               updated_at = excluded.updated_at",
            params![
                id,
                serde_json::to_string(request)?,
                request.created_at.to_rfc3339(),
                request.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_notification(conn: &Connection, notification: &Notification) -> AppResult<()> {
        conn.execute(
            "INSERT INTO notifications (id, request_id, doc_json, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               request_id = excluded.request_id,
               doc_json = excluded.doc_json,
               is_read = excluded.is_read",
            params![
                notification.id,
                notification.request_id,
                serde_json::to_string(notification)?,
                if notification.read { 1 } else { 0 },
                notification.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl RecordStore for Database {
    fn get(&self, id: &str) -> AppResult<Option<Request>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row("SELECT doc_json FROM requests WHERE id = ?1", [id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        raw.map(|raw| serde_json::from_str::<Request>(&raw).map_err(AppError::from))
            .transpose()
    }

    fn get_all(&self) -> AppResult<BTreeMap<String, Request>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT id, doc_json FROM requests")?;
        let rows = statement.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut requests = BTreeMap::new();
        for row in rows {
            let (id, raw) = row?;
            match serde_json::from_str::<Request>(&raw) {
                Ok(request) => {
                    requests.insert(id, request);
                }
                Err(error) => {
                    tracing::warn!(request_id = %id, error = %error, "skipping malformed request document");
                }
            }
        }
        Ok(requests)
    }

    fn put(&self, id: &str, request: &Request) -> AppResult<()> {
        let conn = self.lock()?;
        Self::write_request(&conn, id, request)
    }

    fn update(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Request>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row("SELECT doc_json FROM requests WHERE id = ?1", [id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let current: Request = serde_json::from_str(&raw)?;
        let updated: Request = patch_document(&current, fields, &IMMUTABLE_REQUEST_FIELDS)?;
        Self::write_request(&conn, id, &updated)?;
        Ok(Some(updated))
    }

    fn delete(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM requests WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    fn get_all_notifications(&self) -> AppResult<Vec<Notification>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT id, doc_json FROM notifications ORDER BY created_at DESC")?;
        let rows = statement.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            match serde_json::from_str::<Notification>(&raw) {
                Ok(notification) => notifications.push(notification),
                Err(error) => {
                    tracing::warn!(notification_id = %id, error = %error, "skipping malformed notification document");
                }
            }
        }
        Ok(notifications)
    }

    fn put_notifications(&self, batch: &[Notification]) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for notification in batch {
            Self::write_notification(&tx, notification)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_notification(&self, id: &str, fields: serde_json::Value) -> AppResult<Option<Notification>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row("SELECT doc_json FROM notifications WHERE id = ?1", [id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let current: Notification = serde_json::from_str(&raw)?;
        let updated: Notification = patch_document(&current, fields, &["id"])?;
        Self::write_notification(&conn, &updated)?;
        Ok(Some(updated))
    }

    fn delete_notification(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{Notification, NotificationType, Priority, Request, RequestStatus};
    use crate::store::RecordStore;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn sample_request(id: &str) -> Request {
        let created = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        Request {
            id: id.to_string(),
            manual_id: None,
            title: "Clinic staffing".to_string(),
            details: "Two additional nurses".to_string(),
            receiving_authority: "Ministry of Health".to_string(),
            submission_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            status: RequestStatus::UnderReview,
            documents: vec!["petition.pdf".to_string(), "annex.docx".to_string()],
            response_status: false,
            response_date: None,
            response_details: None,
            implementation_date: None,
            followup_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn sample_notification(id: &str, request_id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            r#type: NotificationType::Delayed,
            title: "Delayed response".to_string(),
            message: "No response for 19 days".to_string(),
            request_id: request_id.to_string(),
            priority: Priority::High,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap(),
            read: false,
        }
    }

    #[test]
    fn database_can_store_and_read_request_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let request = sample_request("req-1");
        db.put(&request.id, &request).expect("put");

        let loaded = db.get("req-1").expect("get").expect("exists");
        assert_eq!(loaded, request);
        assert!(db.get("req-2").expect("get").is_none());

        let all = db.get_all().expect("get all");
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("req-1"));
    }

    #[test]
    fn update_merges_fields_and_delete_removes_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let request = sample_request("req-1");
        db.put(&request.id, &request).expect("put");

        let updated = db
            .update(
                "req-1",
                serde_json::json!({ "responseStatus": true, "responseDate": "2024-02-10", "id": "other" }),
            )
            .expect("update")
            .expect("exists");
        assert!(updated.response_status);
        assert_eq!(updated.response_date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(updated.id, "req-1");
        assert_eq!(updated.documents.len(), 2);

        assert!(db.delete("req-1").expect("delete"));
        assert!(!db.delete("req-1").expect("second delete"));
        assert!(db.get_all().expect("get all").is_empty());
    }

    #[test]
    fn notifications_round_trip_and_read_flag_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.put_notifications(&[
            sample_notification("delayedResponse-req1-1", "req1"),
            sample_notification("delayedResponse-req2-2", "req2"),
        ])
        .expect("put notifications");
        assert_eq!(db.get_all_notifications().expect("list").len(), 2);

        let updated = db
            .update_notification("delayedResponse-req1-1", serde_json::json!({ "read": true }))
            .expect("update")
            .expect("exists");
        assert!(updated.read);

        assert!(db.delete_notification("delayedResponse-req2-2").expect("delete"));
        let remaining = db.get_all_notifications().expect("list");
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].read);
    }

    #[test]
    fn reopening_the_database_keeps_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        {
            let db = Database::new(&path).expect("db");
            let request = sample_request("req-keep");
            db.put(&request.id, &request).expect("put");
        }
        let db = Database::new(&path).expect("reopen");
        assert_eq!(db.path(), path.as_path());
        assert!(db.get("req-keep").expect("get").is_some());
    }
}
