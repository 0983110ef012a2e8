//! HTTP glue for the upload stage.
//!
//! Either hands the parsed form to the next stage or returns the finished
//! error response, so a rejected request never reaches the event handler.

use hyper::{Body, Request, Response, StatusCode, header::CONTENT_TYPE};
use multer::Multipart;

use crate::sys_config::core::UploadPolicy;
use crate::sys_core::handlers::message_response;
use crate::sys_upload::core::{self, UploadError, UploadedForm};

pub async fn handler_upload(
    req: Request<Body>,
    policy: &UploadPolicy,
) -> Result<UploadedForm, Response<Body>> {
    match parse_upload(req, policy).await {
        Ok(form) => Ok(form),
        Err(e) => Err(error_response(&e)),
    }
}

async fn parse_upload(req: Request<Body>, policy: &UploadPolicy) -> Result<UploadedForm, UploadError> {
    // parse boundary
    let ct = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .ok_or(UploadError::MissingContentType)?;
    let boundary = multer::parse_boundary(ct).map_err(UploadError::BadBoundary)?;

    let multipart = Multipart::new(req.into_body(), boundary);
    core::ingest_multipart(multipart, policy).await
}

pub fn error_response(err: &UploadError) -> Response<Body> {
    if err.is_client_error() {
        tracing::warn!(error = ?err, "upload rejected");
        message_response(StatusCode::BAD_REQUEST, &err.to_string())
    } else {
        tracing::error!(error = %err, "upload error");
        message_response(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed")
    }
}
