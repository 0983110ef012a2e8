//! Core upload logic: no Hyper types here.
//!
//! Parts are written to a staging directory first. Nothing reaches the public
//! upload directory until [`commit`] runs, which the event handler only does
//! after the record has been persisted.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use multer::{Field, Multipart};
use rand::Rng;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

use crate::sys_config::core::UploadPolicy;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Missing Content-Type")]
    MissingContentType,

    #[error("Bad boundary: {0}")]
    BadBoundary(multer::Error),

    #[error("Invalid form data: {0}")]
    Multipart(#[from] multer::Error),

    #[error("Unexpected field")]
    UnexpectedField { field: String },

    #[error("Too many files")]
    TooManyFiles { field: String },

    #[error("Only image files are allowed!")]
    InvalidMimeType { mime_type: String },

    #[error("File too large")]
    FileTooLarge { field: String, limit: u64 },

    #[error("Field value too long")]
    FieldTooLarge { field: String },

    #[error("Upload failed: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Everything except local I/O trouble is the client's fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

/// Metadata for one accepted file part.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub field_name: String,
    pub generated_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Final location once committed.
    pub relative_path: PathBuf,
    pub staged_path: PathBuf,
}

/// Everything the upload stage hands to the next stage.
#[derive(Debug, Default)]
pub struct UploadedForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Vec<StoredFile>>,
}

impl UploadedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Files received under `name`, in arrival order.
    pub fn files(&self, name: &str) -> &[StoredFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn all_files(&self) -> impl Iterator<Item = &StoredFile> {
        self.files.values().flatten()
    }
}

/// `<unix-millis>-<random>` plus the original extension.
///
/// The original base name never reaches the filesystem.
pub fn generate_stored_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{millis}-{suffix}{}", extension_of(original_name))
}

/// Dotted extension of `name`, or an empty string.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// Client-declared type check. The header is trusted as sent.
pub fn accepts_mime(policy: &UploadPolicy, declared: Option<&str>) -> bool {
    declared
        .map(|m| m.trim().to_ascii_lowercase())
        .is_some_and(|m| m.starts_with(&policy.accepted_mime_prefix))
}

/// Consume the whole multipart body under `policy`.
///
/// The first violation stops consumption; any file staged so far for this
/// request is removed before the error is returned.
pub async fn ingest_multipart(
    mut multipart: Multipart<'_>,
    policy: &UploadPolicy,
) -> Result<UploadedForm, UploadError> {
    let mut form = UploadedForm::default();
    match read_parts(&mut multipart, policy, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            discard(&form).await;
            Err(e)
        }
    }
}

async fn read_parts(
    multipart: &mut Multipart<'_>,
    policy: &UploadPolicy,
    form: &mut UploadedForm,
) -> Result<(), UploadError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        let original_name = match field.file_name().map(str::to_string) {
            None => {
                let text = read_text(field, &name, policy.max_field_size_bytes).await?;
                form.fields.insert(name, text);
                continue;
            }
            // empty file input
            Some(f) if f.is_empty() => continue,
            Some(f) => f,
        };

        let mime_type = field.content_type().map(|m| m.to_string());
        check_file_part(policy, form, &name, mime_type.as_deref())?;

        let stored = stage_field(
            field,
            policy,
            &name,
            original_name,
            mime_type.unwrap_or_default(),
        )
        .await?;
        tracing::debug!(
            field = %name,
            stored_name = %stored.generated_name,
            size_bytes = stored.size_bytes,
            "staged upload part"
        );
        form.files.entry(name).or_default().push(stored);
    }
    Ok(())
}

/// Acceptance checks that must pass before a single byte is written.
fn check_file_part(
    policy: &UploadPolicy,
    form: &UploadedForm,
    name: &str,
    mime_type: Option<&str>,
) -> Result<(), UploadError> {
    let spec = policy
        .field_spec(name)
        .ok_or_else(|| UploadError::UnexpectedField {
            field: name.to_string(),
        })?;
    if form.files(name).len() >= spec.max_count || form.total_files() >= policy.max_file_count {
        return Err(UploadError::TooManyFiles {
            field: name.to_string(),
        });
    }
    if !accepts_mime(policy, mime_type) {
        return Err(UploadError::InvalidMimeType {
            mime_type: mime_type.unwrap_or_default().to_string(),
        });
    }
    Ok(())
}

async fn read_text(mut field: Field<'_>, name: &str, limit: usize) -> Result<String, UploadError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = next_chunk(&mut field).await? {
        if buf.len() + chunk.len() > limit {
            return Err(UploadError::FieldTooLarge {
                field: name.to_string(),
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn stage_field(
    mut field: Field<'_>,
    policy: &UploadPolicy,
    name: &str,
    original_name: String,
    mime_type: String,
) -> Result<StoredFile, UploadError> {
    let staging = policy.staging_directory();
    fs::create_dir_all(&staging).await?;

    let (generated_name, mut file) = create_unique(&staging, &original_name).await?;
    let staged_path = staging.join(&generated_name);

    let size_bytes = match copy_limited(&mut field, &mut file, name, policy.max_file_size_bytes).await {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            remove_quietly(&staged_path).await;
            return Err(e);
        }
    };

    Ok(StoredFile {
        field_name: name.to_string(),
        relative_path: policy.destination_directory.join(&generated_name),
        generated_name,
        original_name,
        mime_type,
        size_bytes,
        staged_path,
    })
}

async fn copy_limited(
    field: &mut Field<'_>,
    file: &mut fs::File,
    name: &str,
    limit: u64,
) -> Result<u64, UploadError> {
    let mut written: u64 = 0;
    while let Some(chunk) = next_chunk(field).await? {
        written += chunk.len() as u64;
        if written > limit {
            return Err(UploadError::FileTooLarge {
                field: name.to_string(),
                limit,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn next_chunk(field: &mut Field<'_>) -> Result<Option<Bytes>, UploadError> {
    Ok(field.chunk().await?)
}

/// Create a fresh file under `dir`, retrying on the (unlikely) name clash.
async fn create_unique(dir: &Path, original_name: &str) -> io::Result<(String, fs::File)> {
    let mut attempts = 0;
    loop {
        let candidate = generate_stored_name(original_name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < 8 => {
                attempts += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Move every staged file of `form` into the public upload directory.
pub async fn commit(form: &UploadedForm) -> io::Result<()> {
    for stored in form.all_files() {
        if let Some(parent) = stored.relative_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::try_exists(&stored.relative_path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", stored.relative_path.display()),
            ));
        }
        fs::rename(&stored.staged_path, &stored.relative_path).await?;
    }
    Ok(())
}

/// Remove every staged file of `form`. Failures are only logged.
pub async fn discard(form: &UploadedForm) {
    for stored in form.all_files() {
        remove_quietly(&stored.staged_path).await;
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove staged file"),
    }
}

/// Delete staged files older than `max_age`. Returns how many were removed.
pub async fn sweep_once(staging: &Path, max_age: Duration) -> io::Result<usize> {
    let mut dir = match fs::read_dir(staging).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = dir.next_entry().await? {
        // committed or discarded by a request since the listing
        let modified = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        let modified = match modified {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let age = modified.elapsed().unwrap_or(Duration::ZERO);
        if age >= max_age {
            remove_quietly(&entry.path()).await;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Periodic staging cleanup. Runs until the process exits.
pub async fn sweep_staging(staging: PathBuf, max_age: Duration, every: Duration) {
    if every.is_zero() {
        tracing::info!("sweep interval is 0. staging sweep will not run");
        return;
    }

    let mut interval = tokio::time::interval(every);
    tracing::info!(dir = %staging.display(), "starting staging sweep");
    loop {
        interval.tick().await;
        match sweep_once(&staging, max_age).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "swept stale staged uploads"),
            Err(e) => tracing::error!(error = %e, "staging sweep failed"),
        }
    }
}
