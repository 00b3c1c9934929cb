//! Admin HTTP server.
//!
//! Serves `/routes` (dump of every dynamic route table, optionally filtered
//! by `route_config_name`), plus `/healthz` and `/readyz` probes. Runs on
//! its own listener so the data plane is never behind it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::init::InitManager;
use crate::provider::ProviderManager;

const ROUTES_GENERAL_USAGE: &str = "/routes (dump all dynamic HTTP route tables).";
const ROUTES_SPECIFY_NAME_USAGE: &str =
    "/routes?route_config_name=<name> (dump all dynamic HTTP route tables with the <name> if any).";

/// Shared state behind the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub providers: Arc<ProviderManager>,
    pub init: Arc<InitManager>,
}

/// Dispatches one admin request.
pub async fn admin_handler(
    req: Request<hyper::body::Incoming>,
    state: AdminState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" => text_response(StatusCode::OK, "ok"),
        "/readyz" => {
            if state.init.is_ready() {
                text_response(StatusCode::OK, "ok")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "initializing")
            }
        }
        "/routes" => routes_response(req.uri().query(), &state),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

fn routes_response(query: Option<&str>, state: &AdminState) -> Response<Full<Bytes>> {
    let params: Vec<(&str, &str)> = query
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
        .collect();

    let filter = match params.as_slice() {
        [] => None,
        [("route_config_name", name)] => Some(*name),
        _ => {
            let usage = serde_json::json!({
                "general_usage": ROUTES_GENERAL_USAGE,
                "specify_name_usage": ROUTES_SPECIFY_NAME_USAGE,
            });
            return json_response(StatusCode::NOT_FOUND, &usage.to_string());
        }
    };

    let dumps = state.providers.dump(filter);
    if filter.is_some() && dumps.is_empty() {
        return text_response(StatusCode::OK, "");
    }

    match serde_json::to_string_pretty(&dumps) {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response")
}

fn json_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response")
}

/// Starts the admin server on the given address. Runs until the listener
/// errors or the task is dropped.
pub async fn start_admin_server(addr: SocketAddr, state: AdminState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| admin_handler(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "admin connection error");
            }
        });
    }
}
