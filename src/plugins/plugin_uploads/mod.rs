use async_trait::async_trait;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::{convert::Infallible, path::PathBuf};

use crate::sys_core::{core::Plugin, handlers::message_response};
use crate::sys_statichost::handlers::handler_static;

// ---------------------- Plugin ----------------------

/// Public read access to committed uploads.
pub struct PluginUploads {
    upload_dir: PathBuf,
    public_prefix: String,
}

impl PluginUploads {
    pub fn new(upload_dir: PathBuf, public_prefix: String) -> Self {
        Self {
            upload_dir,
            public_prefix,
        }
    }
}

#[async_trait]
impl Plugin for PluginUploads {
    async fn plugin_init(&mut self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.upload_dir).await {
            tracing::error!(dir = %self.upload_dir.display(), error = %e, "could not create upload directory");
        }
    }

    fn plugin_name(&self) -> &str {
        "PluginUploads"
    }

    fn plugin_can_handle(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with(&self.public_prefix)
    }

    async fn plugin_handle(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return Ok(message_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
        }
        Ok(handler_static(&self.upload_dir, &self.public_prefix, req.uri().path()).await)
    }
}
