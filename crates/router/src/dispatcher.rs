//! Request dispatch.
//!
//! [`Dispatcher::serve`] walks one request through the pipeline:
//!
//! 1. unknown verbs are rejected with `405`
//! 2. `BeforeStatic` filters, then static file serving
//! 3. session start and form parsing
//! 4. `BeforeRouter` filters, then the route lookup (or a pre-resolved controller)
//! 5. `BeforeExec` filters, the handler, `AfterExec` and `FinishRouter` filters
//! 6. statistics, access log and the pending status
//!
//! Failures and panics of any step are recovered at the boundary: an abort is swallowed,
//! a failure whose text is a registered exception code renders that error page, anything
//! else is logged with a captured stack.

use crate::config::RouterConfig;
use crate::controller::Lifecycle;
use crate::error::{HandlerError, HandlerResult, RouterError};
use crate::exception::{ErrorPages, ExceptionHandler};
use crate::filter::{FilterFlow, FilterPosition};
use crate::hooks::{
    AccessLogFilter, DefaultAccessLogFilter, ErrorRenderer, FormParser, PlainErrorRenderer, SessionStore, StaticServer,
    Statistics,
};
use crate::response::{BufferedWriter, ResponseWriter};
use crate::router::{RouteKind, Router, HTTP_METHODS};
use crate::Context;
use bytes::Bytes;
use futures::FutureExt;
use http::header::SERVER;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

type MonitorFilter = dyn Fn(&Method, &str, Duration) -> bool + Send + Sync;

/// What happens after the pipeline returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Record statistics, log the access and flush the pending status.
    Finalize,
    Return,
}

pub struct DispatcherBuilder {
    router: Router,
    static_server: Option<Arc<dyn StaticServer>>,
    sessions: Option<Arc<dyn SessionStore>>,
    forms: Option<Arc<dyn FormParser>>,
    exceptions: Arc<dyn ExceptionHandler>,
    statistics: Option<Arc<dyn Statistics>>,
    monitor_filter: Arc<MonitorFilter>,
    access_log_filter: Option<Arc<dyn AccessLogFilter>>,
    error_renderer: Arc<dyn ErrorRenderer>,
}

impl DispatcherBuilder {
    fn new(router: Router) -> Self {
        Self {
            router,
            static_server: None,
            sessions: None,
            forms: None,
            exceptions: Arc::new(ErrorPages::new()),
            statistics: None,
            monitor_filter: Arc::new(|_: &Method, _: &str, _: Duration| true),
            access_log_filter: None,
            error_renderer: Arc::new(PlainErrorRenderer),
        }
    }

    pub fn static_server(mut self, static_server: impl StaticServer + 'static) -> Self {
        self.static_server = Some(Arc::new(static_server));
        self
    }

    pub fn session_store(mut self, sessions: impl SessionStore + 'static) -> Self {
        self.sessions = Some(Arc::new(sessions));
        self
    }

    pub fn form_parser(mut self, forms: impl FormParser + 'static) -> Self {
        self.forms = Some(Arc::new(forms));
        self
    }

    pub fn exceptions(mut self, exceptions: impl ExceptionHandler + 'static) -> Self {
        self.exceptions = Arc::new(exceptions);
        self
    }

    pub fn statistics(mut self, statistics: impl Statistics) -> Self {
        self.statistics = Some(Arc::new(statistics));
        self
    }

    /// Decides per request whether statistics are recorded.
    pub fn monitor_filter<F>(mut self, monitor_filter: F) -> Self
    where
        F: Fn(&Method, &str, Duration) -> bool + Send + Sync + 'static,
    {
        self.monitor_filter = Arc::new(monitor_filter);
        self
    }

    pub fn access_log_filter(mut self, access_log_filter: impl AccessLogFilter + 'static) -> Self {
        self.access_log_filter = Some(Arc::new(access_log_filter));
        self
    }

    pub fn error_renderer(mut self, error_renderer: impl ErrorRenderer + 'static) -> Self {
        self.error_renderer = Arc::new(error_renderer);
        self
    }

    pub fn build(self) -> Result<Dispatcher, RouterError> {
        let config = self.router.shared_config();
        if config.session_on && self.sessions.is_none() {
            return Err(RouterError::MissingCollaborator { name: "session store", option: "session_on" });
        }
        if config.enable_admin && self.statistics.is_none() {
            return Err(RouterError::MissingCollaborator { name: "statistics", option: "enable_admin" });
        }

        let access_log_filter =
            self.access_log_filter.unwrap_or_else(|| Arc::new(DefaultAccessLogFilter::new(config.static_dirs.clone())));
        let lifecycle = Lifecycle { enable_xsrf: config.enable_xsrf, auto_render: config.auto_render };

        Ok(Dispatcher {
            router: self.router,
            config,
            lifecycle,
            static_server: self.static_server,
            sessions: self.sessions,
            forms: self.forms,
            exceptions: self.exceptions,
            statistics: self.statistics,
            monitor_filter: self.monitor_filter,
            access_log_filter,
            error_renderer: self.error_renderer,
        })
    }
}

/// Runs requests through the filters and the route table of a [`Router`].
pub struct Dispatcher {
    router: Router,
    config: Arc<RouterConfig>,
    lifecycle: Lifecycle,
    static_server: Option<Arc<dyn StaticServer>>,
    sessions: Option<Arc<dyn SessionStore>>,
    forms: Option<Arc<dyn FormParser>>,
    exceptions: Arc<dyn ExceptionHandler>,
    statistics: Option<Arc<dyn Statistics>>,
    monitor_filter: Arc<MonitorFilter>,
    access_log_filter: Arc<dyn AccessLogFilter>,
    error_renderer: Arc<dyn ErrorRenderer>,
}

impl Dispatcher {
    pub fn builder(router: Router) -> DispatcherBuilder {
        DispatcherBuilder::new(router)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatches a request into a buffered [`Response`].
    pub async fn call(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HandlerError> {
        let mut writer = BufferedWriter::new();
        self.serve(&mut writer, request).await?;
        Ok(writer.into_response())
    }

    /// Dispatches a request, writing the response to `writer`.
    ///
    /// An error is only returned when panic recovery is disabled; a panic is then resumed.
    pub async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Bytes>) -> HandlerResult {
        let mut ctx = Context::new(writer, request, self.config.case_sensitive);
        if self.config.run_mode.is_dev() {
            match HeaderValue::from_str(&self.config.server_name) {
                Ok(server) => {
                    ctx.output_mut().header(SERVER, server);
                }
                Err(e) => warn!(cause = %e, "invalid server name"),
            }
        }

        let outcome = AssertUnwindSafe(self.dispatch(&mut ctx)).catch_unwind().await;

        if let Some(mut session) = ctx.session.take() {
            session.release(&mut ctx.output).await;
        }

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => self.recover(&mut ctx, e).await,
            Err(payload) => {
                let aborted = payload.downcast_ref::<HandlerError>().is_some_and(HandlerError::is_abort);
                if !aborted && !self.config.recover_panic {
                    std::panic::resume_unwind(payload);
                }
                self.recover(&mut ctx, HandlerError::from_panic(payload)).await
            }
        }
    }

    async fn dispatch(&self, ctx: &mut Context<'_>) -> HandlerResult {
        if self.run(ctx).await? == Flow::Finalize {
            self.finalize(ctx);
        }
        Ok(())
    }

    async fn run(&self, ctx: &mut Context<'_>) -> Result<Flow, HandlerError> {
        let filters = self.router.filters();

        if !HTTP_METHODS.contains(ctx.method()) {
            ctx.output_mut().error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")?;
            return Ok(Flow::Finalize);
        }

        if filters.run(FilterPosition::BeforeStatic, ctx).await? == FilterFlow::Stop {
            return Ok(Flow::Finalize);
        }

        if let Some(static_server) = &self.static_server {
            if static_server.serve_static(ctx).await || ctx.is_started() {
                ctx.found = true;
                return Ok(Flow::Finalize);
            }
        }

        if self.config.session_on {
            if let Some(sessions) = &self.sessions {
                match sessions.start(&mut ctx.output, &ctx.request).await {
                    Ok(session) => ctx.session = Some(session),
                    Err(e) => {
                        error!(cause = %e, "failed to start session");
                        self.exceptions.exception("503", ctx).await;
                        return Ok(Flow::Return);
                    }
                }
            }
        }

        if *ctx.method() != Method::GET && *ctx.method() != Method::HEAD {
            if let Some(forms) = &self.forms {
                if self.config.copy_request_body && !forms.is_upload(ctx) {
                    if let Err(e) = forms.copy_body(ctx, self.config.max_memory).await {
                        warn!(cause = %e, "failed to copy request body");
                    }
                }
                if let Err(e) = forms.parse_form(ctx, self.config.max_memory).await {
                    warn!(cause = %e, "failed to parse form");
                }
            }
        }

        if filters.run(FilterPosition::BeforeRouter, ctx).await? == FilterFlow::Stop {
            return Ok(Flow::Finalize);
        }

        let mut controller = ctx.run_controller.clone();
        if controller.is_some() {
            ctx.found = true;
        } else {
            let method = ctx.effective_method().into_owned();
            if let Some((route, mut params)) = self.router.find(&method, ctx.route_path()) {
                params.explode_splat();
                if !params.is_empty() {
                    ctx.params = params;
                }
                ctx.route = Some(Arc::clone(route));
                ctx.found = true;
            }
        }

        if !ctx.found {
            self.exceptions.exception("404", ctx).await;
            return Ok(Flow::Finalize);
        }

        if filters.run(FilterPosition::BeforeExec, ctx).await? == FilterFlow::Stop {
            return Ok(Flow::Finalize);
        }

        if let Some(route) = ctx.route.clone() {
            match route.kind() {
                RouteKind::Function { methods, handler, .. } => {
                    if !methods.contains(ctx.method()) {
                        self.exceptions.exception("405", ctx).await;
                        return Ok(Flow::Finalize);
                    }
                    handler.call(ctx).await?;
                }
                RouteKind::Raw { handler, .. } => {
                    handler.serve_http(&mut ctx.output, &ctx.request).await?;
                }
                RouteKind::Controller { controller: target, methods } => {
                    let method = ctx.effective_method();
                    let run_method = methods
                        .get(method.as_str())
                        .or_else(|| methods.get("*"))
                        .cloned()
                        .unwrap_or_else(|| method.as_str().to_owned());
                    controller = Some((Arc::clone(target), run_method));
                }
            }
        }

        if let Some((target, run_method)) = controller {
            ctx.handler_name = Some(target.name().to_owned());
            target.execute(ctx, &run_method, self.lifecycle).await?;
        }

        if filters.run(FilterPosition::AfterExec, ctx).await? == FilterFlow::Stop {
            return Ok(Flow::Finalize);
        }
        filters.run(FilterPosition::FinishRouter, ctx).await?;

        Ok(Flow::Finalize)
    }

    fn finalize(&self, ctx: &mut Context<'_>) {
        let elapsed = ctx.elapsed();

        if self.config.enable_admin {
            if let Some(statistics) = &self.statistics {
                if (self.monitor_filter)(ctx.method(), ctx.path(), elapsed) {
                    let record = StatisticsRecord {
                        method: ctx.method().to_string(),
                        path: ctx.path().to_owned(),
                        handler: ctx.handler_name().unwrap_or_default().to_owned(),
                        elapsed,
                    };
                    record.submit(Arc::clone(statistics));
                }
            }
        }

        if (self.config.run_mode.is_dev() || self.config.access_logs) && !self.access_log_filter.skip(ctx.path()) {
            let outcome = if ctx.found { "match" } else { "notmatch" };
            debug!(
                method = %ctx.method(),
                path = ctx.path(),
                pattern = ctx.matched_pattern().unwrap_or_default(),
                elapsed = ?elapsed,
                outcome,
                "access"
            );
        }

        if let Some(status) = ctx.output.pending_status() {
            ctx.output.write_header(status);
        }
    }

    async fn recover(&self, ctx: &mut Context<'_>, err: HandlerError) -> HandlerResult {
        if err.is_abort() {
            return Ok(());
        }
        if !self.config.recover_panic {
            return Err(err);
        }

        if self.config.enable_errors_show {
            let code = err.to_string();
            if self.exceptions.contains(&code) {
                self.exceptions.exception(&code, ctx).await;
                return Ok(());
            }
        }

        let url = ctx.uri().to_string();
        let stack = Backtrace::force_capture().to_string();
        error!(url = %url, cause = %err, "handler crashed");
        error!("{stack}");

        if self.config.run_mode.is_dev() {
            self.error_renderer.show_err(&mut ctx.output, &url, &err, &stack);
        }
        Ok(())
    }
}

struct StatisticsRecord {
    method: String,
    path: String,
    handler: String,
    elapsed: Duration,
}

impl StatisticsRecord {
    /// Hands the record to the sink off the request path when a runtime is available.
    fn submit(self, statistics: Arc<dyn Statistics>) {
        let task = move || statistics.add_statistics(&self.method, &self.path, &self.handler, self.elapsed);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { task() });
            }
            Err(_) => task(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("router", &self.router).field("lifecycle", &self.lifecycle).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder").field("router", &self.router).finish_non_exhaustive()
    }
}
