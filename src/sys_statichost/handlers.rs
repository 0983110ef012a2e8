//! HTTP glue: serve whatever `core::map_upload_path` gives us.

use std::path::Path;

use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::{Body, Response, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::sys_core::handlers::message_response;
use crate::sys_statichost::core;

/// Stream a committed upload, or 404.
pub async fn handler_static(upload_dir: &Path, public_prefix: &str, uri: &str) -> Response<Body> {
    let Some(path) = core::map_upload_path(upload_dir, public_prefix, uri) else {
        return message_response(StatusCode::NOT_FOUND, "Not found");
    };

    match File::open(&path).await {
        Ok(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let mut resp = Response::new(Body::wrap_stream(ReaderStream::new(file)));
            if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
                resp.headers_mut().insert(CONTENT_TYPE, value);
            }
            // stored names are never reused
            resp.headers_mut().insert(
                CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            resp
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not open upload");
            message_response(StatusCode::NOT_FOUND, "Not found")
        }
    }
}
