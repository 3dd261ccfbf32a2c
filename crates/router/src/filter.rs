//! The filter pipeline.
//!
//! Filters are callbacks attached to one of five points of request processing and to a
//! path pattern, compiled into the same trie the routes use. Placeholders captured by a
//! filter pattern are merged into the request parameters before the filter runs.

use crate::error::{HandlerError, RouterError};
use crate::handler::FilterFunc;
use crate::params::Params;
use crate::tree::Tree;
use crate::Context;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::trace;

/// The points of request processing filters attach to, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterPosition {
    /// Before static file serving.
    BeforeStatic,
    /// Before the route lookup.
    BeforeRouter,
    /// After the route lookup, before the handler runs.
    BeforeExec,
    AfterExec,
    FinishRouter,
}

impl FilterPosition {
    pub const ALL: [FilterPosition; 5] = [
        FilterPosition::BeforeStatic,
        FilterPosition::BeforeRouter,
        FilterPosition::BeforeExec,
        FilterPosition::AfterExec,
        FilterPosition::FinishRouter,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Whether the request continues after a filter point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFlow {
    Continue,
    /// A filter with `return_on_output` saw a started response.
    Stop,
}

/// A filter bound to a path pattern.
pub struct FilterRouter {
    pattern: String,
    tree: Tree<()>,
    filter_func: Arc<dyn FilterFunc>,
    return_on_output: bool,
}

impl FilterRouter {
    /// Compiles `matching_pattern`, the case folded form of `pattern`. A pattern without a
    /// leading `/` is rooted, so `"*"` applies to every path.
    pub(crate) fn new(
        pattern: &str,
        matching_pattern: &str,
        filter_func: Arc<dyn FilterFunc>,
        return_on_output: bool,
    ) -> Result<Self, RouterError> {
        let matching_pattern = if matching_pattern.starts_with('/') {
            Cow::Borrowed(matching_pattern)
        } else {
            Cow::Owned(format!("/{matching_pattern}"))
        };
        let mut tree = Tree::new();
        tree.insert(&matching_pattern, ())?;
        Ok(Self { pattern: pattern.to_owned(), tree, filter_func, return_on_output })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn return_on_output(&self) -> bool {
        self.return_on_output
    }

    /// The parameters captured from `path`, `None` when the filter does not apply.
    pub fn valid_router(&self, path: &str) -> Option<Params> {
        self.tree.find(path).map(|(_, params)| params)
    }
}

impl std::fmt::Debug for FilterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRouter")
            .field("pattern", &self.pattern)
            .field("return_on_output", &self.return_on_output)
            .finish_non_exhaustive()
    }
}

/// Filters of every position in insertion order.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: [Vec<FilterRouter>; 5],
}

impl FilterChain {
    pub(crate) fn push(&mut self, position: FilterPosition, filter: FilterRouter) {
        self.filters[position.index()].push(filter);
    }

    pub fn at(&self, position: FilterPosition) -> &[FilterRouter] {
        &self.filters[position.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.filters.iter().all(Vec::is_empty)
    }

    /// Runs the filters of `position` whose pattern matches the request path.
    ///
    /// Before and after every filter, a filter with `return_on_output` stops the chain
    /// once the response has started.
    pub async fn run(&self, position: FilterPosition, ctx: &mut Context<'_>) -> Result<FilterFlow, HandlerError> {
        for filter in self.at(position) {
            if filter.return_on_output && ctx.is_started() {
                return Ok(FilterFlow::Stop);
            }

            if let Some(params) = filter.valid_router(ctx.route_path()) {
                trace!(?position, pattern = filter.pattern(), "run filter");
                ctx.params_mut().extend(params);
                filter.filter_func.call(ctx).await?;
            }

            if filter.return_on_output && ctx.is_started() {
                return Ok(FilterFlow::Stop);
            }
        }
        Ok(FilterFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterChain, FilterFlow, FilterPosition, FilterRouter};
    use crate::error::{HandlerError, HandlerResult};
    use crate::handler::BoxFuture;
    use crate::response::BufferedWriter;
    use crate::Context;
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use std::sync::Arc;

    fn writes<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async move {
            let id = ctx.param("id").unwrap_or("none").to_owned();
            ctx.output_mut().set_status(StatusCode::UNAUTHORIZED);
            ctx.output_mut().body(id)
        })
    }

    fn tags<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async move {
            ctx.params_mut().insert("tagged", "yes");
            Ok(())
        })
    }

    fn fails<'c>(_ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async { Err(HandlerError::code("403")) })
    }

    fn filter(pattern: &str, f: impl crate::handler::FilterFunc, return_on_output: bool) -> FilterRouter {
        FilterRouter::new(pattern, pattern, Arc::new(f), return_on_output).unwrap()
    }

    fn request(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn valid_router_captures() {
        let filter = filter("/admin/:id/*", tags, true);
        let params = filter.valid_router("/admin/7/edit").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert!(filter.valid_router("/user/7").is_none());
    }

    #[test]
    fn unrooted_pattern_is_rooted() {
        let every = filter("*", tags, false);
        assert_eq!(every.pattern(), "*");
        assert_eq!(every.valid_router("/anything/at/all").unwrap().get(":splat"), Some("anything/at/all"));
        assert!(every.valid_router("/").is_some());

        let admin = filter("admin/:id", tags, false);
        assert_eq!(admin.valid_router("/admin/7").unwrap().get("id"), Some("7"));
    }

    #[tokio::test]
    async fn stop_after_output() {
        let mut chain = FilterChain::default();
        chain.push(FilterPosition::BeforeRouter, filter("/admin/:id", writes, true));
        chain.push(FilterPosition::BeforeRouter, filter("/*", tags, true));

        let mut writer = BufferedWriter::new();
        let mut ctx = Context::new(&mut writer, request("/admin/3"), true);
        let flow = chain.run(FilterPosition::BeforeRouter, &mut ctx).await.unwrap();

        assert_eq!(flow, FilterFlow::Stop);
        assert_eq!(ctx.param("id"), Some("3"));
        assert_eq!(ctx.param("tagged"), None);
        drop(ctx);
        assert_eq!(writer.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(writer.body(), b"3");
    }

    #[tokio::test]
    async fn continue_without_return_on_output() {
        let mut chain = FilterChain::default();
        chain.push(FilterPosition::AfterExec, filter("/admin/:id", writes, false));
        chain.push(FilterPosition::AfterExec, filter("/*", tags, false));

        let mut writer = BufferedWriter::new();
        let mut ctx = Context::new(&mut writer, request("/admin/3"), true);
        let flow = chain.run(FilterPosition::AfterExec, &mut ctx).await.unwrap();

        assert_eq!(flow, FilterFlow::Continue);
        assert_eq!(ctx.param("tagged"), Some("yes"));
    }

    #[tokio::test]
    async fn unmatched_filter_is_skipped() {
        let mut chain = FilterChain::default();
        chain.push(FilterPosition::BeforeExec, filter("/admin/*", writes, true));

        let mut writer = BufferedWriter::new();
        let mut ctx = Context::new(&mut writer, request("/public"), true);
        let flow = chain.run(FilterPosition::BeforeExec, &mut ctx).await.unwrap();

        assert_eq!(flow, FilterFlow::Continue);
        assert!(!ctx.is_started());
        assert!(chain.at(FilterPosition::BeforeStatic).is_empty());
    }

    #[tokio::test]
    async fn failure_propagates() {
        let mut chain = FilterChain::default();
        chain.push(FilterPosition::BeforeExec, filter("/*", fails, true));

        let mut writer = BufferedWriter::new();
        let mut ctx = Context::new(&mut writer, request("/anything"), true);
        let err = chain.run(FilterPosition::BeforeExec, &mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "403");
    }
}
