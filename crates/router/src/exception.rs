//! Error pages.
//!
//! The dispatcher renders an error page by code whenever a request ends in a known
//! failure: `"404"` when nothing matched, `"405"` for a function route outside its verbs,
//! `"503"` when a session cannot start, and any failure whose text is a registered code.

use crate::error::HandlerResult;
use crate::handler::{BoxFuture, FilterFunc};
use crate::response::ResponseWriter;
use crate::Context;
use async_trait::async_trait;
use http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Renders error pages by code.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    /// Whether a page is registered for `code`.
    fn contains(&self, code: &str) -> bool;

    /// Writes the page of `code` to the response.
    async fn exception(&self, code: &str, ctx: &mut Context<'_>);
}

const BUILTIN_PAGES: [(&str, &str); 9] = [
    ("401", "Unauthorized"),
    ("403", "Forbidden"),
    ("404", "Page Not Found"),
    ("405", "Method Not Allowed"),
    ("500", "Internal Server Error"),
    ("501", "Not Implemented"),
    ("502", "Bad Gateway"),
    ("503", "Service Unavailable"),
    ("504", "Gateway Timeout"),
];

/// Error pages keyed by code, including plain text built-in pages.
///
/// An unknown code falls back to the `"503"` page, then to the `"500"` page. Without
/// either the code is written as the body. A numeric code is the response status; for a
/// textual one the explicitly set status is kept, `503` otherwise.
pub struct ErrorPages {
    pages: HashMap<String, Arc<dyn FilterFunc>>,
}

struct BuiltinPage {
    status: StatusCode,
    text: &'static str,
}

impl FilterFunc for BuiltinPage {
    fn call<'c>(&self, ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        let text = format!("{} {}", self.status.as_u16(), self.text);
        Box::pin(async move { ctx.output_mut().body(text) })
    }
}

impl ErrorPages {
    pub fn new() -> Self {
        let mut pages = Self::empty();
        for (code, text) in BUILTIN_PAGES {
            let status = status_of(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            pages.pages.insert(code.to_owned(), Arc::new(BuiltinPage { status, text }));
        }
        pages
    }

    /// Error pages without the built-in ones.
    pub fn empty() -> Self {
        Self { pages: HashMap::new() }
    }

    /// Registers the page of `code`, replacing the previous one.
    pub fn page<F>(mut self, code: impl Into<String>, page: F) -> Self
    where
        F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
    {
        self.pages.insert(code.into(), Arc::new(page));
        self
    }
}

impl Default for ErrorPages {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorPages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes = self.pages.keys().collect::<Vec<_>>();
        codes.sort();
        f.debug_struct("ErrorPages").field("codes", &codes).finish()
    }
}

/// The status of a numeric code.
fn status_of(code: &str) -> Option<StatusCode> {
    code.parse::<u16>().ok().and_then(|code| StatusCode::from_u16(code).ok())
}

/// The status written for `code`: the code itself, else the explicitly set status, else `503`.
fn status_for(code: &str, ctx: &Context<'_>) -> StatusCode {
    status_of(code).or(ctx.output().status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

#[async_trait]
impl ExceptionHandler for ErrorPages {
    fn contains(&self, code: &str) -> bool {
        self.pages.contains_key(code)
    }

    async fn exception(&self, code: &str, ctx: &mut Context<'_>) {
        for candidate in [code, "503", "500"] {
            let Some(page) = self.pages.get(candidate) else {
                continue;
            };

            let status = status_for(candidate, ctx);
            ctx.output_mut().write_header(status);
            if let Err(e) = page.call(ctx).await {
                error!(code = candidate, cause = %e, "error page failed");
            }
            return;
        }

        let status = status_for(code, ctx);
        ctx.output_mut().write_header(status);
        if let Err(e) = ctx.output_mut().body(code) {
            warn!(code, cause = %e, "failed to write error code");
        }
    }
}
