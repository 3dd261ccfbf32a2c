//! The per-request state threaded through filters, handlers and controllers.

use crate::controller::ControllerRef;
use crate::hooks::Session;
use crate::params::Params;
use crate::response::{Output, ResponseWriter};
use crate::router::RouteInfo;
use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Request, Uri};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Represents one request while it is dispatched.
///
/// A context is created by the [`Dispatcher`](crate::Dispatcher) for each request and owns
/// the request, the parameters captured so far and the tracked response [`Output`].
pub struct Context<'w> {
    pub(crate) request: Request<Bytes>,
    pub(crate) output: Output<'w>,
    pub(crate) params: Params,
    query: Params,
    route_path: String,
    extensions: Extensions,
    started_at: Instant,

    pub(crate) session: Option<Box<dyn Session>>,
    pub(crate) run_controller: Option<(ControllerRef, String)>,
    pub(crate) route: Option<Arc<RouteInfo>>,
    pub(crate) handler_name: Option<String>,
    pub(crate) found: bool,
}

impl<'w> Context<'w> {
    /// Creates a context. The path used for matching is percent-decoded, and lower-cased
    /// when `case_sensitive` is false.
    pub fn new(writer: &'w mut dyn ResponseWriter, request: Request<Bytes>, case_sensitive: bool) -> Self {
        let query = parse_query(request.uri());
        let path = decode_path(request.uri().path());
        let route_path = if case_sensitive { path.into_owned() } else { path.to_lowercase() };

        Self {
            request,
            output: Output::new(writer),
            params: Params::new(),
            query,
            route_path,
            extensions: Extensions::new(),
            started_at: Instant::now(),
            session: None,
            run_controller: None,
            route: None,
            handler_name: None,
            found: false,
        }
    }

    #[inline]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    /// The request path as received.
    #[inline]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// The request path as seen by the route and filter tries.
    #[inline]
    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Replaces the request body, used by form parsers that buffer the payload.
    pub fn set_body(&mut self, body: Bytes) {
        *self.request.body_mut() = body;
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// A value of the url query string.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key)
    }

    pub fn output(&self) -> &Output<'w> {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Output<'w> {
        &mut self.output
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.output.is_started()
    }

    pub fn session(&self) -> Option<&dyn Session> {
        self.session.as_deref()
    }

    pub fn session_mut(&mut self) -> Option<&mut (dyn Session + 'static)> {
        self.session.as_deref_mut()
    }

    /// Pre-resolves the controller and the method to run, bypassing the route lookup.
    pub fn set_run_controller(&mut self, controller: &ControllerRef, run_method: impl Into<String>) {
        self.run_controller = Some((Arc::clone(controller), run_method.into()));
    }

    /// The route the request matched, if the lookup has happened and succeeded.
    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_deref()
    }

    pub fn matched_pattern(&self) -> Option<&str> {
        self.route.as_deref().map(RouteInfo::pattern)
    }

    /// Name of the controller that handled the request.
    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Time spent since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The request method with a `_method=PUT|DELETE` override of POST applied.
    pub(crate) fn effective_method(&self) -> Cow<'_, Method> {
        let method = self.method();
        if *method == Method::POST {
            match self.query("_method") {
                Some("PUT") => return Cow::Owned(Method::PUT),
                Some("DELETE") => return Cow::Owned(Method::DELETE),
                _ => {}
            }
        }
        Cow::Borrowed(method)
    }
}

fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or_else(|e| {
        trace!(path, cause = %e, "keep undecodable path as is");
        Cow::Borrowed(path)
    })
}

fn parse_query(uri: &Uri) -> Params {
    let Some(query) = uri.query() else {
        return Params::new();
    };

    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            trace!(query, cause = %e, "ignore malformed query string");
            Params::new()
        }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("params", &self.params)
            .field("output", &self.output)
            .field("found", &self.found)
            .finish_non_exhaustive()
    }
}
