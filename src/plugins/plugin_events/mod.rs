use async_trait::async_trait;
use hyper::{Body, Method, Request, Response, StatusCode, header::ALLOW, header::HeaderValue};
use std::convert::Infallible;

use crate::sys_core::{core::Plugin, handlers::message_response};
use crate::sys_events::handlers::{self, EventsContext};

// ---------------------- Plugin ----------------------

/// `POST /events` creates, `GET /events` lists.
pub struct PluginEvents {
    ctx: EventsContext,
}

impl PluginEvents {
    pub fn new(ctx: EventsContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Plugin for PluginEvents {
    async fn plugin_init(&mut self) {
        tracing::info!(
            mode = ?self.ctx.policy.mode,
            upload_dir = %self.ctx.policy.destination_directory.display(),
            max_files = self.ctx.policy.max_file_count,
            "events plugin ready"
        );
    }

    fn plugin_name(&self) -> &str {
        "PluginEvents"
    }

    fn plugin_can_handle(&self, req: &Request<Body>) -> bool {
        req.uri().path().trim_end_matches('/') == "/events"
    }

    async fn plugin_handle(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let resp = match *req.method() {
            Method::POST => handlers::handler_create_event(req, &self.ctx).await,
            Method::GET => handlers::handler_list_events(&self.ctx).await,
            _ => {
                let mut resp = message_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                resp.headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET, POST"));
                resp
            }
        };
        Ok(resp)
    }
}
