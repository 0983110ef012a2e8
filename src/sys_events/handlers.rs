//! HTTP glue: upload stage, event creation, then commit or discard the files.

use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use serde::Serialize;

use crate::sys_config::core::{UploadMode, UploadPolicy};
use crate::sys_core::handlers::{json_response, message_response};
use crate::sys_events::core::{EventError, EventStore, create_event};
use crate::sys_upload::{core as upload, handlers::handler_upload};

/// Shared, read-only state of the `/events` routes.
#[derive(Clone)]
pub struct EventsContext {
    pub policy: Arc<UploadPolicy>,
    pub store: Arc<dyn EventStore>,
    pub public_prefix: String,
}

pub async fn handler_create_event(req: Request<Body>, ctx: &EventsContext) -> Response<Body> {
    let form = match handler_upload(req, &ctx.policy).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    match create_event(ctx.store.as_ref(), &form, ctx.policy.mode, &ctx.public_prefix).await {
        Ok(event) => {
            if let Err(e) = upload::commit(&form).await {
                tracing::error!(event_id = %event.id, error = %e, "could not commit uploaded files");
            }
            tracing::info!(event_id = %event.id, files = form.total_files(), "event created");
            json_response(StatusCode::CREATED, &event)
        }
        Err(e) => {
            upload::discard(&form).await;
            tracing::warn!(error = %e, "event rejected");
            error_response(&e, ctx.policy.mode)
        }
    }
}

pub async fn handler_list_events(ctx: &EventsContext) -> Response<Body> {
    match ctx.store.list().await {
        Ok(events) => json_response(StatusCode::OK, &events),
        Err(e) => {
            tracing::error!(error = %e, "list error");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not list events")
        }
    }
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    message: &'a str,
}

/// Every handler-time failure is a 400.
fn error_response(err: &EventError, mode: UploadMode) -> Response<Body> {
    let message = err.to_string();
    match (err, mode) {
        (EventError::MissingRequiredFile, UploadMode::Multi) => json_response(
            StatusCode::BAD_REQUEST,
            &Failure {
                success: false,
                message: &message,
            },
        ),
        _ => message_response(StatusCode::BAD_REQUEST, &message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys_config::core::{FIELD_ADDITIONAL_IMAGES, FIELD_COVER_IMAGE};
    use crate::sys_events::core::{EventDraft, MemoryEventStore, PersistError, PersistedEvent};
    use crate::sys_upload::test_support::FormBody;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts insert attempts and forwards to memory.
    #[derive(Default)]
    struct RecordingStore {
        inserts: AtomicUsize,
        inner: MemoryEventStore,
    }

    #[async_trait]
    impl EventStore for RecordingStore {
        async fn insert(&self, draft: EventDraft) -> Result<PersistedEvent, PersistError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(draft).await
        }

        async fn list(&self) -> Result<Vec<PersistedEvent>, PersistError> {
            self.inner.list().await
        }
    }

    /// Saves the record, then occupies the cover's final path so the commit fails.
    struct SquattingStore {
        upload_dir: std::path::PathBuf,
        inner: MemoryEventStore,
    }

    #[async_trait]
    impl EventStore for SquattingStore {
        async fn insert(&self, draft: EventDraft) -> Result<PersistedEvent, PersistError> {
            let event = self.inner.insert(draft).await?;
            let name = event.cover_image_path.trim_start_matches("/uploads/");
            std::fs::write(self.upload_dir.join(name), b"taken").unwrap();
            Ok(event)
        }

        async fn list(&self) -> Result<Vec<PersistedEvent>, PersistError> {
            self.inner.list().await
        }
    }

    fn context(mode: UploadMode, dir: &Path) -> (EventsContext, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let ctx = EventsContext {
            policy: Arc::new(UploadPolicy::for_mode(mode, dir)),
            store: store.clone(),
            public_prefix: "/uploads/".to_string(),
        };
        (ctx, store)
    }

    async fn body_json(resp: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Regular files directly under the upload directory, staging excluded.
    fn committed(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn multi_mode_creates_event() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());
        let before = Utc::now();

        let req = FormBody::new()
            .text("name", "Launch")
            .text("details", "Rooftop party")
            .file(FIELD_COVER_IMAGE, "cover.png", "image/png", b"cover")
            .file(FIELD_ADDITIONAL_IMAGES, "a.jpg", "image/jpeg", b"a")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;

        let cover = json["coverImage"].as_str().unwrap();
        let generated = cover.strip_prefix("/uploads/").unwrap();
        assert!(generated.ends_with(".png"));
        assert!(!generated.contains("cover"));
        assert_eq!(json["additionalImages"].as_array().unwrap().len(), 1);

        let date = DateTime::parse_from_rfc3339(json["date"].as_str().unwrap()).unwrap();
        assert!(date.with_timezone(&Utc) >= before);

        let mut files = committed(dir.path());
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f == generated));
        assert_eq!(std::fs::read(dir.path().join(generated)).unwrap(), b"cover");
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);

        let listed = body_json(handler_list_events(&ctx).await).await;
        assert_eq!(listed[0]["coverImage"], cover);
    }

    #[tokio::test]
    async fn additional_images_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _store) = context(UploadMode::Multi, dir.path());

        let req = FormBody::new()
            .text("name", "Launch")
            .text("details", "d")
            .text("date", "2026-05-01")
            .file(FIELD_COVER_IMAGE, "cover.png", "image/png", b"c")
            .request("/events");

        let json = body_json(handler_create_event(req, &ctx).await).await;
        assert_eq!(json["additionalImages"], serde_json::json!([]));
        assert_eq!(json["date"], "2026-05-01T00:00:00Z");
    }

    #[tokio::test]
    async fn multi_mode_missing_cover() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());

        let req = FormBody::new()
            .text("name", "Launch")
            .file(FIELD_ADDITIONAL_IMAGES, "a.png", "image/png", b"a")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Cover image is required");
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
        assert!(committed(dir.path()).is_empty());
        assert_eq!(std::fs::read_dir(ctx.policy.staging_directory()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn single_mode_missing_cover() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Single, dir.path());

        let req = FormBody::new().text("name", "Launch").request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json, serde_json::json!({ "message": "Cover image is required" }));
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_mode_creates_event() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _store) = context(UploadMode::Single, dir.path());

        let req = FormBody::new()
            .text("name", "Launch")
            .text("details", "d")
            .file(FIELD_COVER_IMAGE, "c.jpeg", "image/jpeg", b"c")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert!(json["coverImage"].as_str().unwrap().ends_with(".jpeg"));
        assert_eq!(json["additionalImages"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn too_many_additional_images_never_persist() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());

        let mut body = FormBody::new()
            .text("name", "Launch")
            .text("details", "d")
            .file(FIELD_COVER_IMAGE, "c.png", "image/png", b"c");
        for i in 0..6 {
            body = body.file(FIELD_ADDITIONAL_IMAGES, &format!("{i}.png"), "image/png", b"x");
        }

        let resp = handler_create_event(body.request("/events"), &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "Too many files");
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
        assert!(committed(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn non_image_cover_never_reaches_handler() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());

        let req = FormBody::new()
            .text("name", "Launch")
            .text("details", "d")
            .file(FIELD_COVER_IMAGE, "c.png", "text/html", b"<script>")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "Only image files are allowed!");
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistence_failure_is_400_and_discards_files() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());

        let req = FormBody::new()
            .text("details", "no name")
            .file(FIELD_COVER_IMAGE, "c.png", "image/png", b"c")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "message": "Event validation failed: name is required" })
        );
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert!(committed(dir.path()).is_empty());
        assert_eq!(std::fs::read_dir(ctx.policy.staging_directory()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn commit_failure_still_answers_created() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = EventsContext {
            policy: Arc::new(UploadPolicy::multi(dir.path())),
            store: Arc::new(SquattingStore {
                upload_dir: dir.path().to_path_buf(),
                inner: MemoryEventStore::new(),
            }),
            public_prefix: "/uploads/".to_string(),
        };

        let req = FormBody::new()
            .text("name", "Launch")
            .text("details", "d")
            .file(FIELD_COVER_IMAGE, "c.png", "image/png", b"cover")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["name"], "Launch");

        let generated = json["coverImage"].as_str().unwrap().trim_start_matches("/uploads/");
        assert_eq!(std::fs::read(dir.path().join(generated)).unwrap(), b"taken");
        assert!(ctx.policy.staging_directory().join(generated).exists());
        assert_eq!(ctx.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_date_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = context(UploadMode::Multi, dir.path());

        let req = FormBody::new()
            .text("name", "n")
            .text("details", "d")
            .text("date", "soon")
            .file(FIELD_COVER_IMAGE, "c.png", "image/png", b"c")
            .request("/events");

        let resp = handler_create_event(req, &ctx).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["message"],
            "Cast to date failed for value \"soon\""
        );
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }
}
