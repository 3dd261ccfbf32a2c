//! Collaborators the dispatcher calls out to.
//!
//! Static file serving, sessions, form parsing, statistics and the access log are not
//! part of routing. The dispatcher only knows them through the traits below, every one
//! of them is optional except the access log filter and the error renderer, which have
//! defaults.

use crate::error::{BoxError, HandlerError};
use crate::response::{Output, ResponseWriter};
use crate::utils::clean_path;
use crate::Context;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};
use std::time::Duration;
use tracing::warn;

/// Serves a request from static files. Returns true when the request was served.
#[async_trait]
pub trait StaticServer: Send + Sync {
    async fn serve_static(&self, ctx: &mut Context<'_>) -> bool;
}

/// Starts a session for a request.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn start(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) -> Result<Box<dyn Session>, BoxError>;
}

/// A session started by a [`SessionStore`]; released once the request is done.
#[async_trait]
pub trait Session: Send {
    fn id(&self) -> &str;

    async fn release(&mut self, writer: &mut dyn ResponseWriter);
}

/// Parses request bodies of non GET/HEAD requests. Failures are logged and ignored.
#[async_trait]
pub trait FormParser: Send + Sync {
    /// Whether the request carries a multipart upload, which is never copied.
    fn is_upload(&self, ctx: &Context<'_>) -> bool {
        ctx.headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.starts_with(mime::MULTIPART_FORM_DATA.as_ref()))
    }

    /// Buffers at most `limit` bytes of the raw body.
    async fn copy_body(&self, ctx: &mut Context<'_>, limit: u64) -> Result<(), BoxError>;

    async fn parse_form(&self, ctx: &mut Context<'_>, limit: u64) -> Result<(), BoxError>;
}

/// The statistics sink fed with one record per finished request.
pub trait Statistics: Send + Sync + 'static {
    fn add_statistics(&self, method: &str, path: &str, handler: &str, elapsed: Duration);
}

/// Decides whether the access log line of a request is skipped.
#[cfg_attr(test, mockall::automock)]
pub trait AccessLogFilter: Send + Sync {
    fn skip(&self, path: &str) -> bool;
}

/// Skips `/favicon.ico`, `/robots.txt` and everything below a static directory.
#[derive(Debug, Clone)]
pub struct DefaultAccessLogFilter {
    static_dirs: Vec<String>,
}

impl DefaultAccessLogFilter {
    pub fn new(static_dirs: Vec<String>) -> Self {
        Self { static_dirs }
    }
}

impl AccessLogFilter for DefaultAccessLogFilter {
    fn skip(&self, path: &str) -> bool {
        let path = clean_path(path);
        if path == "/favicon.ico" || path == "/robots.txt" {
            return true;
        }
        self.static_dirs.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Renders an unrecovered failure to the client, used in dev mode only.
pub trait ErrorRenderer: Send + Sync {
    fn show_err(&self, output: &mut Output<'_>, url: &str, err: &HandlerError, stack: &str);
}

/// Writes a plain text 500 page with the failure, the url and the captured stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainErrorRenderer;

impl ErrorRenderer for PlainErrorRenderer {
    fn show_err(&self, output: &mut Output<'_>, url: &str, err: &HandlerError, stack: &str) {
        let text = format!("{err}\n\nRequest url: {url}\n\nStack:\n{stack}");
        if let Err(e) = output.error(StatusCode::INTERNAL_SERVER_ERROR, &text) {
            warn!(cause = %e, "failed to render error page");
        }
    }
}
