//! HTTP glue shared by every system: the server loop and JSON responses.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use hyper::{
    Body, Response, Server, StatusCode,
    header::{CONTENT_TYPE, HeaderValue},
    service::{make_service_fn, service_fn},
};
use serde::Serialize;

use crate::sys_core::core::PluginManager;

/// Serve `manager` on `port` until Ctrl-C.
pub async fn run_server(port: u16, manager: Arc<PluginManager>) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let make_svc = make_service_fn(move |_conn| {
        let manager = manager.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let manager = manager.clone();
                async move { Ok::<_, Infallible>(manager.dispatch(req).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!(%addr, "listening");

    server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(e) => {
            tracing::error!(error = %e, "json error");
            let mut resp = Response::new(Body::from("JSON serialization error"));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
}

/// `{ "message": ... }` with the given status.
pub fn message_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &Message { message })
}
