//! Event creation: turn an accepted upload form into a persisted record.

use std::{io, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
};
use uuid::Uuid;

use crate::sys_config::core::{FIELD_ADDITIONAL_IMAGES, FIELD_COVER_IMAGE, UploadMode};
use crate::sys_upload::core::UploadedForm;

/// What the handler asks the store to save.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub name: Option<String>,
    pub details: Option<String>,
    #[serde(rename = "coverImage")]
    pub cover_image_path: String,
    #[serde(rename = "additionalImages")]
    pub additional_image_paths: Vec<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEvent {
    pub id: Uuid,
    pub name: String,
    pub details: String,
    #[serde(rename = "coverImage")]
    pub cover_image_path: String,
    #[serde(rename = "additionalImages", default)]
    pub additional_image_paths: Vec<String>,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Event validation failed: {field} is required")]
    Validation { field: &'static str },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Cover image is required")]
    MissingRequiredFile,

    #[error("Cast to date failed for value \"{0}\"")]
    InvalidDate(String),

    #[error(transparent)]
    Persistence(#[from] PersistError),
}

/// The record-insert collaborator.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, draft: EventDraft) -> Result<PersistedEvent, PersistError>;

    async fn list(&self) -> Result<Vec<PersistedEvent>, PersistError>;
}

/// Store-side validation, then stamp id and creation time.
pub fn persist_from_draft(draft: EventDraft) -> Result<PersistedEvent, PersistError> {
    let name = required("name", draft.name)?;
    let details = required("details", draft.details)?;
    Ok(PersistedEvent {
        id: Uuid::new_v4(),
        name,
        details,
        cover_image_path: draft.cover_image_path,
        additional_image_paths: draft.additional_image_paths,
        date: draft.date,
        created_at: Utc::now(),
    })
}

fn required(field: &'static str, value: Option<String>) -> Result<String, PersistError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(PersistError::Validation { field })
}

#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<PersistedEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, draft: EventDraft) -> Result<PersistedEvent, PersistError> {
        let event = persist_from_draft(draft)?;
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn list(&self) -> Result<Vec<PersistedEvent>, PersistError> {
        Ok(self.events.read().await.clone())
    }
}

/// Appends one JSON object per line.
pub struct JsonlEventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn insert(&self, draft: EventDraft) -> Result<PersistedEvent, PersistError> {
        let event = persist_from_draft(draft)?;
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(event)
    }

    async fn list(&self) -> Result<Vec<PersistedEvent>, PersistError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(PersistError::from))
            .collect()
    }
}

/// `/uploads/` + generated name.
pub fn public_path(prefix: &str, generated_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), generated_name)
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (taken as UTC) or a bare date
/// (midnight UTC). Missing or blank means `now`.
pub fn parse_date(raw: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>, EventError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| EventError::InvalidDate(raw.to_string()))
}

/// Build the draft from the form. The cover image check comes first.
pub fn build_draft(
    form: &UploadedForm,
    mode: UploadMode,
    public_prefix: &str,
    now: DateTime<Utc>,
) -> Result<EventDraft, EventError> {
    let cover = form
        .files(FIELD_COVER_IMAGE)
        .first()
        .ok_or(EventError::MissingRequiredFile)?;

    let additional_image_paths = match mode {
        UploadMode::Single => Vec::new(),
        UploadMode::Multi => form
            .files(FIELD_ADDITIONAL_IMAGES)
            .iter()
            .map(|f| public_path(public_prefix, &f.generated_name))
            .collect(),
    };

    Ok(EventDraft {
        name: form.field("name").map(str::to_string),
        details: form.field("details").map(str::to_string),
        cover_image_path: public_path(public_prefix, &cover.generated_name),
        additional_image_paths,
        date: parse_date(form.field("date"), now)?,
    })
}

/// Validate, then make exactly one insert attempt.
pub async fn create_event(
    store: &dyn EventStore,
    form: &UploadedForm,
    mode: UploadMode,
    public_prefix: &str,
) -> Result<PersistedEvent, EventError> {
    let draft = build_draft(form, mode, public_prefix, Utc::now())?;
    Ok(store.insert(draft).await?)
}
