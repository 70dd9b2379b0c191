//!
//! HTTP Server
//!
//! HTTP/1 accept loop on tokio. Each connection is served by its own task;
//! each request is answered on a blocking worker because the engine call
//! is synchronous. The loop stops when the shutdown future resolves;
//! connections already accepted finish on their own tasks.
//!

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::endpoint::{QueryEndpoint, Reply};
use crate::errors::ServerError;

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve<F>(endpoint: QueryEndpoint, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let addr = endpoint.config().socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving read-only queries");
    serve_listener(endpoint, listener, shutdown).await
}

pub async fn serve_listener<F>(
    endpoint: QueryEndpoint,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let endpoint = Arc::new(endpoint);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let endpoint = Arc::clone(&endpoint);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let endpoint = Arc::clone(&endpoint);
                async move { handle_request(req, endpoint).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(%peer, error = %e, "Connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    endpoint: Arc<QueryEndpoint>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query_string = req.uri().query().unwrap_or("").to_string();

    let reply = if method != Method::GET {
        Reply {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: json!({ "error": "only GET is supported" }).to_string(),
        }
    } else {
        match tokio::task::spawn_blocking(move || endpoint.respond(&query_string)).await {
            Ok(reply) => reply,
            Err(e) => Reply {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({ "error": e.to_string() }).to_string(),
            },
        }
    };

    info!(
        %method,
        %path,
        status = reply.status.as_u16(),
        elapsed = ?start.elapsed(),
        "Request"
    );
    Ok(into_response(reply))
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = reply.status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
