//! HTTP front end
//!
//! A single `POST /invoke` endpoint in front of a shared [`Runner`].
//! Each connection is served on its own task.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

pub use crate::server::routes::{INVOKE_PATH, Reply, Route};

mod routes;

use crate::runner::Runner;

/// Errors that stop the HTTP service
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    runner: Runner,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_listener(runner, listener, shutdown).await
}

/// Serve connections from an already bound listener until `shutdown`
/// resolves
pub async fn serve_listener(
    runner: Runner,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    info!(addr = %listener.local_addr()?, "listening");

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            () = &mut shutdown => {
                info!("shutting down");
                runner.close();
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Usually transient (e.g. out of file descriptors)
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        let runner = runner.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request| handle(runner.clone(), request));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn handle(
    runner: Runner,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let reply = match Route::resolve(request.method(), request.uri().path()) {
        Route::NotFound => Reply::not_found(),
        Route::MethodNotAllowed => Reply::method_not_allowed(),
        Route::Invoke => {
            let limit = runner.config().server.max_body_bytes;
            match Limited::new(request.into_body(), limit).collect().await {
                Ok(body) => routes::invoke(&runner, &body.to_bytes()).await,
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Reply::error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("request body exceeds {limit} bytes"),
                ),
                Err(e) => Reply::error(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read request body: {e}"),
                ),
            }
        }
    };

    debug!(status = %reply.status, "responding");
    Ok(into_response(reply))
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body.to_string())));
    *response.status_mut() = reply.status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
