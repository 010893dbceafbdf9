use crate::cache::SnapshotCache;
use crate::config::{DataPaths, TrackerSettings};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::filter::{filter_requests, paginate};
use crate::models::{
    AlertEvent, CreateRequestPayload, ExportFormat, ExportResponse, FilterCriteria, Notification, Page, Request,
    RequestStatus, Statistics, UpdateRequestPayload,
};
use crate::reminders::{dedupe_key, generate_notifications, requests_needing_followup};
use crate::stats::compute_statistics;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use tokio::sync::broadcast;
use uuid::Uuid;

const ALERT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct TrackerState {
    requests: BTreeMap<String, Request>,
    notifications: Vec<Notification>,
    requests_loaded: bool,
    notifications_loaded: bool,
}

/// Application state and command handlers. Everything the presentation
/// layer calls goes through here.
pub struct TrackerCore {
    store: Arc<dyn RecordStore>,
    cache: SnapshotCache,
    paths: DataPaths,
    state: RwLock<TrackerState>,
    settings: RwLock<TrackerSettings>,
    check_guard: Mutex<()>,
    alerts: broadcast::Sender<AlertEvent>,
}

impl TrackerCore {
    /// Opens the SQLite store and settings under `paths`.
    pub fn open(paths: DataPaths) -> AppResult<Arc<Self>> {
        let db = Database::new(&paths.database())?;
        tracing::info!(path = %db.path().to_string_lossy(), "opened request store");
        Ok(Self::with_store(Arc::new(db), paths))
    }

    pub fn with_store(store: Arc<dyn RecordStore>, paths: DataPaths) -> Arc<Self> {
        let settings = TrackerSettings::load(&paths.settings());
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            cache: SnapshotCache::new(paths.snapshot()),
            paths,
            state: RwLock::new(TrackerState::default()),
            settings: RwLock::new(settings),
            check_guard: Mutex::new(()),
            alerts,
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Requests ───────────────────────────────────────────────────────────

    pub fn add_request(&self, payload: CreateRequestPayload) -> AppResult<Request> {
        let title = payload.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Request title cannot be empty".to_string()));
        }
        let authority = payload.receiving_authority.trim().to_string();
        if authority.is_empty() {
            return Err(AppError::Validation("Receiving authority cannot be empty".to_string()));
        }

        let manual_id = payload
            .manual_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);
        if let Some(manual_id) = &manual_id {
            if self.store.get(manual_id)?.is_some() {
                return Err(AppError::Validation(format!(
                    "A request with id {} already exists",
                    manual_id
                )));
            }
        }

        let id = manual_id
            .clone()
            .unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()));
        let now = Utc::now();
        let request = Request {
            id: id.clone(),
            manual_id,
            title,
            details: payload.details,
            receiving_authority: authority,
            submission_date: payload.submission_date,
            status: payload.status.unwrap_or(RequestStatus::Pending),
            documents: payload.documents,
            response_status: payload.response_status,
            response_date: payload.response_date,
            response_details: payload.response_details,
            implementation_date: payload.implementation_date,
            followup_date: payload.followup_date,
            created_at: now,
            updated_at: now,
        };

        self.store.put(&id, &request)?;
        self.remember_request(request.clone());
        tracing::info!(request_id = %id, status = request.status.as_str(), "request created");
        Ok(request)
    }

    pub fn get_request(&self, id: &str) -> Option<Request> {
        match self.store.get(id) {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(request_id = %id, error = %error, "store read failed; using cached request");
                self.cached_requests().remove(id)
            }
        }
    }

    pub fn update_request(&self, id: &str, mut patch: UpdateRequestPayload) -> AppResult<Request> {
        patch.title = patch.title.map(|title| title.trim().to_string());
        patch.receiving_authority = patch
            .receiving_authority
            .map(|authority| authority.trim().to_string());
        if patch.title.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::Validation("Request title cannot be empty".to_string()));
        }
        if patch
            .receiving_authority
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(AppError::Validation("Receiving authority cannot be empty".to_string()));
        }

        let mut fields = serde_json::to_value(&patch)?;
        if let Some(object) = fields.as_object_mut() {
            object.insert("updatedAt".to_string(), serde_json::Value::String(Utc::now().to_rfc3339()));
        }

        let updated = self
            .store
            .update(id, fields)?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))?;
        self.remember_request(updated.clone());
        tracing::info!(request_id = %id, status = updated.status.as_str(), "request updated");
        Ok(updated)
    }

    pub fn delete_request(&self, id: &str) -> AppResult<bool> {
        let deleted = self.store.delete(id)?;
        {
            let mut state = self.write_state();
            state.requests.remove(id);
        }
        self.persist_request_snapshot();
        if deleted {
            tracing::info!(request_id = %id, "request deleted");
        }
        Ok(deleted)
    }

    pub fn list_requests(&self) -> Vec<Request> {
        self.filter_requests(&FilterCriteria::default())
    }

    pub fn filter_requests(&self, criteria: &FilterCriteria) -> Vec<Request> {
        let requests = self.load_requests();
        filter_requests(requests.values(), criteria)
    }

    pub fn filter_requests_page(&self, criteria: &FilterCriteria, page: usize) -> Page<Request> {
        let page_size = self.get_settings().page_size;
        paginate(self.filter_requests(criteria), page, page_size)
    }

    pub fn get_statistics(&self) -> Statistics {
        let requests = self.load_requests();
        compute_statistics(requests.values(), self.get_settings().recent_limit)
    }

    pub fn requests_needing_followup(&self) -> Vec<Request> {
        self.requests_needing_followup_at(Utc::now())
    }

    pub fn requests_needing_followup_at(&self, now: DateTime<Utc>) -> Vec<Request> {
        let requests = self.load_requests();
        requests_needing_followup(requests.values(), now)
    }

    fn load_requests(&self) -> BTreeMap<String, Request> {
        match self.store.get_all() {
            Ok(requests) => {
                {
                    let mut state = self.write_state();
                    state.requests = requests.clone();
                    state.requests_loaded = true;
                }
                if let Err(error) = self.cache.store_requests(&requests) {
                    tracing::warn!(error = %error, "failed to refresh request snapshot");
                }
                requests
            }
            Err(error) if error.is_store_unavailable() => {
                tracing::warn!(error = %error, "store unavailable; serving cached requests");
                self.cached_requests()
            }
            Err(error) => {
                tracing::error!(error = %error, "store read failed; serving cached requests");
                self.cached_requests()
            }
        }
    }

    fn cached_requests(&self) -> BTreeMap<String, Request> {
        {
            let state = self.read_state();
            if state.requests_loaded {
                return state.requests.clone();
            }
        }
        match self.cache.load() {
            Ok(Some(snapshot)) => snapshot.requests,
            Ok(None) => BTreeMap::new(),
            Err(error) => {
                tracing::error!(error = %error, "request snapshot unreadable");
                BTreeMap::new()
            }
        }
    }

    fn remember_request(&self, request: Request) {
        {
            let mut state = self.write_state();
            state.requests.insert(request.id.clone(), request);
        }
        self.persist_request_snapshot();
    }

    fn persist_request_snapshot(&self) {
        let state = self.read_state();
        if !state.requests_loaded {
            return;
        }
        if let Err(error) = self.cache.store_requests(&state.requests) {
            tracing::warn!(error = %error, "failed to refresh request snapshot");
        }
    }

    // ─── Notifications ──────────────────────────────────────────────────────

    pub fn check_for_notifications(&self) -> Vec<Notification> {
        self.check_for_notifications_at(Utc::now())
    }

    /// Generates, persists and publishes the notifications that are new at
    /// `now`. Returns an empty batch when another check holds the guard or
    /// the store rejects the write.
    pub fn check_for_notifications_at(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let _guard = match self.check_guard.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("previous notification check panicked; continuing");
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("notification check already running; skipping");
                return Vec::new();
            }
        };

        let requests = self.load_requests();
        let existing = self.load_notifications();
        let candidates = generate_notifications(requests.values(), &existing, now);
        if candidates.is_empty() {
            return Vec::new();
        }

        let latest = match self.store.get_all_notifications() {
            Ok(latest) => latest,
            Err(error) => {
                tracing::error!(error = %error, "cannot confirm notification state; batch not persisted");
                return Vec::new();
            }
        };
        let taken: HashSet<String> = latest
            .iter()
            .map(|notification| dedupe_key(&notification.id))
            .collect();
        let batch: Vec<Notification> = candidates
            .into_iter()
            .filter(|notification| !taken.contains(&dedupe_key(&notification.id)))
            .collect();
        if batch.is_empty() {
            return Vec::new();
        }

        if let Err(error) = self.store.put_notifications(&batch) {
            tracing::error!(error = %error, count = batch.len(), "failed to persist notifications");
            return Vec::new();
        }

        {
            let mut state = self.write_state();
            state.notifications = latest;
            state.notifications.extend(batch.iter().cloned());
            state.notifications_loaded = true;
        }
        self.persist_notification_snapshot();
        self.publish(&batch);
        tracing::info!(count = batch.len(), "new notifications generated");
        batch
    }

    fn publish(&self, batch: &[Notification]) {
        let settings = self.get_settings();
        for notification in batch {
            tracing::info!(
                notification_id = %notification.id,
                request_id = %notification.request_id,
                priority = ?notification.priority,
                "{}",
                notification.title
            );
            // No subscribers is fine; alerts are still persisted.
            let _ = self.alerts.send(AlertEvent {
                notification: notification.clone(),
                play_sound: settings.sound_enabled,
                desktop: settings.desktop_notifications_enabled,
            });
        }
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe()
    }

    pub fn list_notifications(&self) -> Vec<Notification> {
        let mut notifications = self.load_notifications();
        notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        notifications
    }

    pub fn unread_count(&self) -> usize {
        self.load_notifications()
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    pub fn mark_as_read(&self, id: &str) -> AppResult<bool> {
        let updated = self
            .store
            .update_notification(id, serde_json::json!({ "read": true }))?;
        let Some(updated) = updated else {
            return Ok(false);
        };
        self.remember_notification(updated);
        Ok(true)
    }

    pub fn mark_all_as_read(&self) -> AppResult<usize> {
        let unread: Vec<String> = self
            .store
            .get_all_notifications()?
            .into_iter()
            .filter(|notification| !notification.read)
            .map(|notification| notification.id)
            .collect();

        let mut marked = 0;
        for id in &unread {
            if self.mark_as_read(id)? {
                marked += 1;
            }
        }
        tracing::info!(count = marked, "notifications marked as read");
        Ok(marked)
    }

    pub fn delete_notification(&self, id: &str) -> AppResult<bool> {
        let deleted = self.store.delete_notification(id)?;
        {
            let mut state = self.write_state();
            state.notifications.retain(|notification| notification.id != id);
        }
        self.persist_notification_snapshot();
        Ok(deleted)
    }

    fn load_notifications(&self) -> Vec<Notification> {
        match self.store.get_all_notifications() {
            Ok(notifications) => {
                {
                    let mut state = self.write_state();
                    state.notifications = notifications.clone();
                    state.notifications_loaded = true;
                }
                self.persist_notification_snapshot();
                notifications
            }
            Err(error) if error.is_store_unavailable() => {
                tracing::warn!(error = %error, "store unavailable; serving cached notifications");
                self.cached_notifications()
            }
            Err(error) => {
                tracing::error!(error = %error, "store read failed; serving cached notifications");
                self.cached_notifications()
            }
        }
    }

    fn cached_notifications(&self) -> Vec<Notification> {
        {
            let state = self.read_state();
            if state.notifications_loaded {
                return state.notifications.clone();
            }
        }
        match self.cache.load() {
            Ok(Some(snapshot)) => snapshot.notifications,
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::error!(error = %error, "notification snapshot unreadable");
                Vec::new()
            }
        }
    }

    fn remember_notification(&self, notification: Notification) {
        {
            let mut state = self.write_state();
            let position = state
                .notifications
                .iter()
                .position(|existing| existing.id == notification.id);
            match position {
                Some(index) => state.notifications[index] = notification,
                None => state.notifications.push(notification),
            }
        }
        self.persist_notification_snapshot();
    }

    fn persist_notification_snapshot(&self) {
        let state = self.read_state();
        if !state.notifications_loaded {
            return;
        }
        if let Err(error) = self.cache.store_notifications(&state.notifications) {
            tracing::warn!(error = %error, "failed to refresh notification snapshot");
        }
    }

    // ─── Settings & export ──────────────────────────────────────────────────

    pub fn get_settings(&self) -> TrackerSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<TrackerSettings> {
        let merged = self.get_settings().merged(update)?;
        merged.save(&self.paths.settings())?;
        let mut writer = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *writer = merged.clone();
        tracing::info!("settings updated");
        Ok(merged)
    }

    pub fn export_requests(&self, criteria: &FilterCriteria, format: &str) -> AppResult<ExportResponse> {
        let format = ExportFormat::parse(format)
            .ok_or_else(|| AppError::Validation(format!("Unsupported export format {}", format)))?;
        let requests = self.filter_requests(criteria);

        let export_dir = self.paths.exports();
        std::fs::create_dir_all(&export_dir).map_err(|error| AppError::Io(error.to_string()))?;
        let output_path = export_dir.join(format!(
            "requests-{}.{}",
            Utc::now().format("%Y%m%d-%H%M%S%3f"),
            format.extension()
        ));

        let contents = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&requests)?,
            ExportFormat::Md => render_markdown_export(&requests),
        };
        std::fs::write(&output_path, contents).map_err(|error| AppError::Io(error.to_string()))?;
        tracing::info!(path = %output_path.to_string_lossy(), count = requests.len(), "requests exported");

        Ok(ExportResponse {
            path: output_path.to_string_lossy().to_string(),
            count: requests.len(),
        })
    }
}

fn render_markdown_export(requests: &[Request]) -> String {
    let mut out = String::from("# Requests\n\n");
    out.push_str("| ID | Title | Authority | Submitted | Status | Response |\n");
    out.push_str("|----|-------|-----------|-----------|--------|----------|\n");
    for request in requests {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            escape_cell(&request.id),
            escape_cell(&request.title),
            escape_cell(&request.receiving_authority),
            request
                .submission_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "-".to_string()),
            request.status.as_str(),
            match (request.response_status, request.response_date) {
                (true, Some(date)) => date.to_string(),
                (true, None) => "yes".to_string(),
                (false, _) => "no".to_string(),
            }
        ));
    }
    out
}

fn escape_cell(raw: &str) -> String {
    raw.replace('|', "\\|").replace('\n', " ")
}
