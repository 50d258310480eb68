//! Response recording and failed-request logging.
//!
//! Handlers build their reply in a [`ResponseRecorder`], which behaves like a
//! buffered response writer: the first header write wins on the wire, while the
//! last attempted status and an optional error annotation are kept for the
//! log. [`error_logger`] runs around the whole router and hands every request
//! that ended with a status of 400 or more to the configured [`RequestLogger`].

use std::{
    fmt,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::Body as _;

/// Buffered response with write-once status semantics.
#[derive(Debug)]
pub struct ResponseRecorder {
    status: StatusCode,
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    error: Option<String>,
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            committed: None,
            body: Vec::new(),
            error: None,
        }
    }

    /// Headers sent with the status line; edits after it is committed are ignored.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Record `status`. Only the first header write, made before any body
    /// bytes, reaches the wire.
    pub fn write_header(&mut self, status: StatusCode) {
        self.status = status;
        if self.committed.is_none() {
            self.commit(status);
        }
    }

    /// Append to the body, committing an implicit 200 if no header was written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.committed.is_none() {
            self.commit(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        data.len()
    }

    /// Plain-text error reply.
    pub fn http_error(&mut self, status: StatusCode, message: &str) {
        self.headers.remove(header::CONTENT_LENGTH);
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        self.write_header(status);
        self.write(message.as_bytes());
    }

    /// Attach a diagnostic for the request log; never sent to the client.
    pub fn annotate_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Last status a handler asked for.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status the client receives.
    pub fn wire_status(&self) -> StatusCode {
        self.committed.as_ref().map_or(StatusCode::OK, |(status, _)| *status)
    }

    pub fn bytes_written(&self) -> usize {
        self.body.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn commit(&mut self, status: StatusCode) {
        self.committed = Some((status, self.headers.clone()));
    }
}

/// What the recorder saw, carried to the middleware in response extensions.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub status: StatusCode,
    pub bytes_written: usize,
    pub error: Option<String>,
}

impl IntoResponse for ResponseRecorder {
    fn into_response(self) -> Response {
        let record = ResponseRecord {
            status: self.status,
            bytes_written: self.body.len(),
            error: self.error,
        };
        let (status, headers) = self.committed.unwrap_or((StatusCode::OK, self.headers));

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.extensions_mut().insert(record);
        response
    }
}

/// One failed request.
#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub method: Method,
    pub uri: String,
    pub protocol: String,
    pub remote_addr: Option<SocketAddr>,
    pub status: StatusCode,
    pub bytes_written: usize,
    pub duration: Duration,
    pub error: String,
}

impl fmt::Display for RequestLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let remote = self.remote_addr.map_or_else(|| "-".to_string(), |addr| addr.to_string());
        write!(
            f,
            "\"{} {} {}\" from {} - {} {}B in {:?} - Error: {}",
            self.method,
            self.uri,
            self.protocol,
            remote,
            self.status.as_u16(),
            self.bytes_written,
            self.duration,
            self.error,
        )
    }
}

/// Destination for failed-request entries.
pub trait RequestLogger: Send + Sync {
    fn log(&self, entry: &RequestLogEntry);
}

/// Emits entries as `tracing` events: 5xx at error level, 4xx at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRequestLogger;

impl RequestLogger for TracingRequestLogger {
    fn log(&self, entry: &RequestLogEntry) {
        let remote_addr = entry.remote_addr.map(|addr| addr.to_string());
        let remote_addr = remote_addr.as_deref().unwrap_or("-");

        if entry.status.is_server_error() {
            tracing::error!(
                method = %entry.method,
                uri = %entry.uri,
                protocol = %entry.protocol,
                remote_addr,
                status = entry.status.as_u16(),
                bytes = entry.bytes_written,
                duration_ms = entry.duration.as_secs_f64() * 1000.0,
                error = %entry.error,
                "{entry}"
            );
        } else {
            tracing::warn!(
                method = %entry.method,
                uri = %entry.uri,
                protocol = %entry.protocol,
                remote_addr,
                status = entry.status.as_u16(),
                bytes = entry.bytes_written,
                duration_ms = entry.duration.as_secs_f64() * 1000.0,
                error = %entry.error,
                "{entry}"
            );
        }
    }
}

/// Router-wide middleware; observes responses without altering them.
pub async fn error_logger(
    State(logger): State<Arc<dyn RequestLogger>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().to_string();
    let protocol = format!("{:?}", request.version());
    let remote_addr =
        request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);

    let response = next.run(request).await;

    // Router-generated replies (404, 405, extractor rejections) carry no record.
    let (status, bytes_written, error) = match response.extensions().get::<ResponseRecord>() {
        Some(record) => {
            (record.status, record.bytes_written, record.error.clone().unwrap_or_default())
        }
        None => {
            let size = response.body().size_hint().exact().unwrap_or_default();
            (response.status(), usize::try_from(size).unwrap_or(usize::MAX), String::new())
        }
    };

    if status.as_u16() >= 400 {
        logger.log(&RequestLogEntry {
            method,
            uri,
            protocol,
            remote_addr,
            status,
            bytes_written,
            duration: started.elapsed(),
            error,
        });
    }

    response
}
