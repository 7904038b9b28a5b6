//! Reverse proxy to a supervised process on the loopback interface.

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::error::{RouterError, RouterResult};

/// Forward `request` to `host:port` and stream the response back as-is.
pub async fn forward(request: Request, host: &str, port: u16) -> RouterResult<Response> {
    let upstream = |message: String| RouterError::Upstream { port, message };

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| upstream(format!("connect: {e}")))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| upstream(format!("handshake: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!(error = %e, "upstream connection error");
        }
    });

    let (mut parts, body) = request.into_parts();
    // Origin-form URI for the upstream request line; the Host header is
    // passed through untouched.
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = path_and_query
        .parse()
        .map_err(|e| upstream(format!("uri: {e}")))?;
    debug!(port, method = %parts.method, uri = %parts.uri, "proxying request");

    let response = sender
        .send_request(hyper::Request::from_parts(parts, body))
        .await
        .map_err(|e| upstream(format!("request: {e}")))?;

    let (parts, incoming) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(incoming)))
}
