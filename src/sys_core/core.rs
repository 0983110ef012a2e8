//! Plugin registry: each system claims a slice of the URL space.

use std::convert::Infallible;

use async_trait::async_trait;
use hyper::{Body, Request, Response};

use crate::sys_core::handlers::message_response;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once before the server starts accepting connections.
    async fn plugin_init(&mut self) {}

    fn plugin_name(&self) -> &str;

    fn plugin_can_handle(&self, req: &Request<Body>) -> bool;

    async fn plugin_handle(&self, req: Request<Body>) -> Result<Response<Body>, Infallible>;
}

pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// First registered plugin wins when several can handle a request.
    pub fn apply_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub async fn init_plugins(&mut self) {
        for plugin in self.plugins.iter_mut() {
            plugin.plugin_init().await;
            tracing::info!(plugin = plugin.plugin_name(), "plugin initialized");
        }
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let resp = match self.plugins.iter().find(|p| p.plugin_can_handle(&req)) {
            Some(plugin) => match plugin.plugin_handle(req).await {
                Ok(resp) => resp,
                Err(never) => match never {},
            },
            None => message_response(hyper::StatusCode::NOT_FOUND, "Not found"),
        };

        tracing::info!(%method, %path, status = resp.status().as_u16(), "request");
        resp
    }
}
