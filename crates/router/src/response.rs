//! Response sinks.
//!
//! The host HTTP layer hands the dispatcher a [`ResponseWriter`]. The dispatcher wraps
//! it into an [`Output`] which remembers whether the response has started and holds an
//! explicitly set status until something writes it.

use crate::error::{HandlerError, HandlerResult};
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use std::io;

/// The sink a host HTTP layer exposes for one response.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers. Only the first call has an effect.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, sending a `200 OK` header first when none was sent.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// An in-memory [`ResponseWriter`] that can be turned into an [`http::Response`].
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The written status, `None` while nothing has been written.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(data);
        Ok(data.len())
    }
}

/// The dispatcher's view of the response: a tracked [`ResponseWriter`].
pub struct Output<'w> {
    writer: &'w mut dyn ResponseWriter,
    started: bool,
    header_written: bool,
    status: Option<StatusCode>,
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("started", &self.started)
            .field("header_written", &self.header_written)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<'w> Output<'w> {
    pub fn new(writer: &'w mut dyn ResponseWriter) -> Self {
        Self { writer, started: false, header_written: false, status: None }
    }

    /// True once a status or body byte has been sent to the host.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Records a status to use for the response without writing it yet.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// The explicitly set status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// An explicitly set status that nobody has written yet.
    pub(crate) fn pending_status(&self) -> Option<StatusCode> {
        if self.header_written { None } else { self.status }
    }

    pub fn header(&mut self, name: http::HeaderName, value: HeaderValue) -> &mut Self {
        self.writer.headers_mut().insert(name, value);
        self
    }

    /// Writes `data` as (part of) the body, sending the explicit status first if one is set.
    pub fn body(&mut self, data: impl AsRef<[u8]>) -> HandlerResult {
        if !self.header_written {
            let status = self.status.unwrap_or(StatusCode::OK);
            self.write_header(status);
        }
        self.write(data.as_ref())?;
        Ok(())
    }

    /// Replies with a plain text error, like `http.Error` of other stacks.
    pub fn error(&mut self, status: StatusCode, text: &str) -> HandlerResult {
        let content_type = HeaderValue::from_str(mime::TEXT_PLAIN_UTF_8.as_ref()).map_err(HandlerError::fault)?;
        self.header(CONTENT_TYPE, content_type);
        self.header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        self.write_header(status);
        self.write(format!("{text}\n").as_bytes())?;
        Ok(())
    }
}

impl ResponseWriter for Output<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.writer.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.started = true;
        self.header_written = true;
        self.writer.write_header(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.started = true;
        self.header_written = true;
        self.writer.write(data)
    }
}
