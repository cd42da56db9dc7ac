//! HTTP/1 server on hyper
//!
//! Each accepted socket gets one [`Connection`]. Hyper serves the requests
//! of a socket one after another, so responses leave in request order.
//! Body frames are fed to the connection as they arrive; the handler runs
//! on tokio's blocking pool.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::config::{CourierConfig, ServerConfig};
use crate::connection::{Connection, Progress};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::http::constants::headers;
use crate::http::{Headers, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpVersion};

/// Smallest read buffer hyper accepts
const MIN_BUF_SIZE: usize = 8192;

pub struct CourierServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl CourierServer {
    pub fn new(config: &CourierConfig, dispatcher: Dispatcher) -> Self {
        Self { config: config.server.clone(), dispatcher: Arc::new(dispatcher) }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn serve(self) -> Result<()> {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        self.serve_listener(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        log::info!("Courier listening on http://{} ({} routes)", local, self.dispatcher.registry().len());

        let keep_alive = self.config.keep_alive;
        let max_buf_size = self.config.max_header_size.max(MIN_BUF_SIZE);

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::warn!("Failed to accept connection: {}", err);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let dispatcher = Arc::clone(&self.dispatcher);

            tokio::task::spawn(async move {
                let conn = Arc::new(Mutex::new(Connection::new(Arc::clone(&dispatcher))));
                let service_conn = Arc::clone(&conn);
                let service = service_fn(move |req| {
                    handle_request(
                        req,
                        remote,
                        Arc::clone(&service_conn),
                        Arc::clone(&dispatcher),
                        keep_alive,
                    )
                });

                if let Err(err) = http1::Builder::new()
                    .keep_alive(keep_alive)
                    .max_buf_size(max_buf_size)
                    .serve_connection(io, service)
                    .await
                {
                    log::debug!("Error serving connection from {}: {:?}", remote, err);
                }
                conn.lock().await.abort();
            });
        }
    }
}

/// Drive one request through the connection state machine
async fn handle_request(
    req: Request<Incoming>,
    remote: SocketAddr,
    conn: Arc<Mutex<Connection>>,
    dispatcher: Arc<Dispatcher>,
    keep_alive: bool,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, mut body) = req.into_parts();
    let mut request = match convert_head(&parts) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("Rejected request head from {}: {}", remote, err);
            let response = HttpResponse::bad_request().text(&err.to_string());
            return Ok(convert_response(response));
        }
    };
    request.set_remote_addr(remote);

    let mut guard = conn.lock().await;
    let mut progress = guard.on_request(request);
    let request = match guard.request() {
        Some(request) => Arc::clone(request),
        None => return Ok(convert_response(HttpResponse::internal_server_error())),
    };

    if matches!(progress, Progress::Pending) {
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Ok(data) = frame.into_data() {
                        progress = guard.on_chunk(&data);
                        if !matches!(progress, Progress::Pending) {
                            break;
                        }
                    }
                }
                Err(err) => {
                    log::debug!("Body of {} {} interrupted: {}", request.method(), request.path(), err);
                    guard.abort();
                    return Ok(convert_response(HttpResponse::bad_request()));
                }
            }
        }
        if matches!(progress, Progress::Pending) {
            progress = guard.on_last();
        }
    }
    drop(guard);

    let dispatched = match progress {
        Progress::Respond(response) => Dispatched::Ready(response),
        Progress::Invoke(ctx) => {
            let worker = Arc::clone(&conn);
            let task = tokio::task::spawn_blocking(move || {
                let mut conn = worker.blocking_lock();
                conn.invoke(ctx)
            });
            match task.await {
                Ok(dispatched) => dispatched,
                Err(err) => {
                    log::error!("Handler task for {} failed: {}", request.path(), err);
                    Dispatched::Ready(HttpResponse::internal_server_error())
                }
            }
        }
        Progress::Pending => {
            log::error!("Request {} {} ended without a response", request.method(), request.path());
            Dispatched::Ready(HttpResponse::internal_server_error())
        }
    };

    let mut response = match dispatched {
        Dispatched::Ready(response) => response,
        Dispatched::Deferred(deferred) => dispatcher.resolve_deferred(deferred).await,
    };

    dispatcher.finalize(&mut response, &request, keep_alive);
    conn.lock().await.on_written();
    dispatcher.record_access(&request, &response);

    Ok(convert_response(response))
}

/// Convert a hyper request head into an [`HttpRequest`]
fn convert_head(parts: &hyper::http::request::Parts) -> Result<HttpRequest, HttpError> {
    let method = HttpMethod::from_str(parts.method.as_str())?;
    let version = match parts.version {
        hyper::Version::HTTP_10 => HttpVersion::Http1_0,
        hyper::Version::HTTP_11 => HttpVersion::Http1_1,
        other => return Err(HttpError::InvalidRequest(format!("Unsupported version {:?}", other))),
    };
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut headers = Headers::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            log::debug!("Dropping non-ASCII header {}", name);
            continue;
        };
        let separator = if *name == hyper::header::COOKIE { "; " } else { ", " };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(separator);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    Ok(HttpRequest::new(method, target, version, headers))
}

/// Convert an [`HttpResponse`] into a hyper response
fn convert_response(mut resp: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(resp.status().as_u16());
    for (name, value) in resp.get_headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for cookie in resp.cookies() {
        builder = builder.header(headers::SET_COOKIE, cookie.to_set_cookie());
    }
    let body = Full::new(Bytes::from(resp.take_body()));

    builder.body(body).unwrap_or_else(|err| {
        log::error!("Invalid response: {}", err);
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
