//! Process configuration and the upload acceptance policy.
//!
//! Everything is read once at startup and then shared read-only (`Arc`).

use std::{env, path::PathBuf, str::FromStr};

/// 5 MiB per file part.
pub const MAX_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
/// Text parts share multer's default `fieldSize` limit.
pub const MAX_FIELD_SIZE_BYTES: usize = 1024 * 1024;
pub const ACCEPTED_MIME_PREFIX: &str = "image/";

pub const FIELD_COVER_IMAGE: &str = "coverImage";
pub const FIELD_ADDITIONAL_IMAGES: &str = "additionalImages";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Which multipart shape `POST /events` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// One `coverImage` part.
    Single,
    /// `coverImage` plus up to four `additionalImages`.
    Multi,
}

impl FromStr for UploadMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(UploadMode::Single),
            "multi" | "fields" => Ok(UploadMode::Multi),
            _ => Err(ConfigError::InvalidValue {
                key: "EVENTS_UPLOAD_MODE",
                value: s.to_string(),
            }),
        }
    }
}

/// A named file field and how many parts it may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFieldSpec {
    pub field_name: String,
    pub max_count: usize,
}

impl FileFieldSpec {
    pub fn new(field_name: &str, max_count: usize) -> Self {
        Self {
            field_name: field_name.to_string(),
            max_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub mode: UploadMode,
    pub max_file_size_bytes: u64,
    pub max_file_count: usize,
    pub max_field_size_bytes: usize,
    pub accepted_mime_prefix: String,
    pub destination_directory: PathBuf,
    pub fields: Vec<FileFieldSpec>,
}

impl UploadPolicy {
    pub fn single<P: Into<PathBuf>>(destination: P) -> Self {
        Self {
            mode: UploadMode::Single,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            max_file_count: 1,
            max_field_size_bytes: MAX_FIELD_SIZE_BYTES,
            accepted_mime_prefix: ACCEPTED_MIME_PREFIX.to_string(),
            destination_directory: destination.into(),
            fields: vec![FileFieldSpec::new(FIELD_COVER_IMAGE, 1)],
        }
    }

    pub fn multi<P: Into<PathBuf>>(destination: P) -> Self {
        Self {
            mode: UploadMode::Multi,
            max_file_count: 5,
            fields: vec![
                FileFieldSpec::new(FIELD_COVER_IMAGE, 1),
                FileFieldSpec::new(FIELD_ADDITIONAL_IMAGES, 4),
            ],
            ..Self::single(destination)
        }
    }

    pub fn for_mode<P: Into<PathBuf>>(mode: UploadMode, destination: P) -> Self {
        match mode {
            UploadMode::Single => Self::single(destination),
            UploadMode::Multi => Self::multi(destination),
        }
    }

    /// Look up the declared spec for a multipart field name.
    pub fn field_spec(&self, name: &str) -> Option<&FileFieldSpec> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// Where parts live until the owning request has been persisted.
    pub fn staging_directory(&self) -> PathBuf {
        self.destination_directory.join(".staging")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub public_prefix: String,
    pub data_file: Option<PathBuf>,
    pub upload_mode: UploadMode,
    pub staging_max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            public_prefix: "/uploads/".to_string(),
            data_file: None,
            upload_mode: UploadMode::Multi,
            staging_max_age_secs: 3600,
            sweep_interval_secs: 600,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            // try both upper- and lower-case names
            env::var(key)
                .or_else(|_| env::var(key.to_ascii_lowercase()))
                .ok()
        })
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = AppConfig::default();

        if let Some(v) = get("EVENTS_PORT") {
            cfg.port = parse("EVENTS_PORT", &v)?;
        }
        if let Some(v) = get("EVENTS_UPLOAD_DIR") {
            cfg.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = get("EVENTS_PUBLIC_PREFIX") {
            cfg.public_prefix = normalize_prefix(&v);
        }
        cfg.data_file = get("EVENTS_DATA_FILE").map(PathBuf::from);
        if let Some(v) = get("EVENTS_UPLOAD_MODE") {
            cfg.upload_mode = v.parse()?;
        }
        if let Some(v) = get("EVENTS_STAGING_MAX_AGE") {
            cfg.staging_max_age_secs = parse("EVENTS_STAGING_MAX_AGE", &v)?;
        }
        if let Some(v) = get("EVENTS_SWEEP_INTERVAL") {
            cfg.sweep_interval_secs = parse("EVENTS_SWEEP_INTERVAL", &v)?;
        }
        Ok(cfg)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::for_mode(self.upload_mode, self.upload_dir.clone())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Force the public prefix into `/name/` form.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
