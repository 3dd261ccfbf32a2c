//! The route table.
//!
//! A [`Router`] keeps one [`Tree`] per HTTP verb, every leaf holding a shared
//! [`RouteInfo`]. Routes are registered through a [`RouterBuilder`] whose methods consume
//! and return the builder:
//!
//! ```
//! use micro_router::{Router, RouterConfig};
//! use micro_router::handler::BoxFuture;
//! use micro_router::{Context, HandlerResult};
//! use http::Method;
//!
//! fn hello<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
//!     Box::pin(async move { ctx.output_mut().body("hello") })
//! }
//!
//! let router = Router::builder(RouterConfig::default())
//!     .get("/hello/:name", hello)?
//!     .build();
//!
//! let (route, params) = router.find(&Method::GET, "/hello/world").unwrap();
//! assert_eq!(route.pattern(), "/hello/:name");
//! assert_eq!(params.get("name"), Some("world"));
//! # Ok::<(), micro_router::RouterError>(())
//! ```

mod url_for;

use crate::config::RouterConfig;
use crate::controller::{ControllerFactory, ControllerRef, EXCEPT_METHODS};
use crate::error::{HandlerResult, RouterError};
use crate::filter::{FilterChain, FilterPosition, FilterRouter};
use crate::handler::{BoxFuture, FilterFunc, RawHandler};
use crate::params::Params;
use crate::tree::Tree;
use crate::utils::join_path;
use crate::Context;
use http::Method;
use std::any::TypeId;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Every verb the router keeps a tree for, in the order reverse resolution visits them.
pub const HTTP_METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::HEAD,
    Method::TRACE,
    Method::CONNECT,
];

/// Parses a verb name case-insensitively, `None` for anything outside [`HTTP_METHODS`].
pub fn parse_method(name: &str) -> Option<Method> {
    HTTP_METHODS.iter().find(|m| m.as_str().eq_ignore_ascii_case(name)).cloned()
}

/// The value stored at a route leaf.
#[derive(Debug, PartialEq)]
pub struct RouteInfo {
    pattern: String,
    kind: RouteKind,
}

/// What a matched route runs.
pub enum RouteKind {
    /// A controller and its verb to capability mapping. An empty mapping runs the
    /// capability named after the request verb.
    Controller { controller: ControllerRef, methods: HashMap<String, String> },
    /// A function handler with the verbs it accepts.
    Function { methods: HashSet<Method>, handler: Arc<dyn FilterFunc>, identity: Option<TypeId> },
    Raw { handler: Arc<dyn RawHandler>, identity: Option<TypeId> },
}

/// Stateless handlers (fn items, closures without captures, unit structs) are the same
/// handler whenever their type is, so registering one twice can be told apart from
/// registering two different handlers.
fn stateless_identity<T: 'static>() -> Option<TypeId> {
    (size_of::<T>() == 0).then(TypeId::of::<T>)
}

fn same_handler<T: ?Sized>(h1: &Arc<T>, id1: Option<TypeId>, h2: &Arc<T>, id2: Option<TypeId>) -> bool {
    Arc::ptr_eq(h1, h2) || (id1.is_some() && id1 == id2)
}

impl RouteInfo {
    /// The pattern as it was registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn kind(&self) -> &RouteKind {
        &self.kind
    }
}

impl PartialEq for RouteKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                RouteKind::Controller { controller: c1, methods: m1 },
                RouteKind::Controller { controller: c2, methods: m2 },
            ) => Arc::ptr_eq(c1, c2) && m1 == m2,
            (
                RouteKind::Function { methods: m1, handler: h1, identity: id1 },
                RouteKind::Function { methods: m2, handler: h2, identity: id2 },
            ) => same_handler(h1, *id1, h2, *id2) && m1 == m2,
            (RouteKind::Raw { handler: h1, identity: id1 }, RouteKind::Raw { handler: h2, identity: id2 }) => {
                same_handler(h1, *id1, h2, *id2)
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteKind::Controller { controller, methods } => f
                .debug_struct("Controller")
                .field("controller", &controller.qualified_name())
                .field("methods", methods)
                .finish(),
            RouteKind::Function { methods, .. } => f.debug_struct("Function").field("methods", methods).finish_non_exhaustive(),
            RouteKind::Raw { .. } => f.debug_struct("Raw").finish_non_exhaustive(),
        }
    }
}

/// Per-verb route trees plus the filter chain, immutable once built.
#[derive(Debug)]
pub struct Router {
    config: Arc<RouterConfig>,
    routers: HashMap<Method, Tree<Arc<RouteInfo>>>,
    filters: FilterChain,
}

impl Router {
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.config)
    }

    /// The tree of one verb, `None` when nothing was registered for it.
    pub fn tree(&self, method: &Method) -> Option<&Tree<Arc<RouteInfo>>> {
        self.routers.get(method)
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Looks up the route of a request path, folding its case when the router is case
    /// insensitive.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Arc<RouteInfo>, Params)> {
        let path = fold_case(&self.config, path);
        self.routers.get(method)?.find(&path)
    }
}

fn fold_case<'a>(config: &RouterConfig, pattern: &'a str) -> Cow<'a, str> {
    if config.case_sensitive { Cow::Borrowed(pattern) } else { Cow::Owned(pattern.to_lowercase()) }
}

macro_rules! method_route {
    ($name:ident, $method:literal) => {
        #[doc = concat!("Registers a function handler for `", $method, "` requests.")]
        pub fn $name<F>(self, pattern: &str, handler: F) -> Result<Self, RouterError>
        where
            F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
        {
            self.add_method($method, pattern, handler)
        }
    };
}

/// Collects routes and filters, then freezes them into a [`Router`].
#[derive(Debug)]
pub struct RouterBuilder {
    config: RouterConfig,
    routers: HashMap<Method, Tree<Arc<RouteInfo>>>,
    filters: FilterChain,
    except_methods: Vec<String>,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            routers: HashMap::new(),
            filters: FilterChain::default(),
            except_methods: EXCEPT_METHODS.iter().map(|m| (*m).to_owned()).collect(),
        }
    }

    /// Registers a controller.
    ///
    /// `mapping` is a `;` separated list of `verbs:Capability` rules where `verbs` is a `,`
    /// separated list of HTTP verbs or `*`, e.g. `"get,post:ApiFunc;put:Update"`. An empty
    /// mapping registers the controller for every verb and runs the capability named after
    /// the request verb.
    pub fn add(mut self, pattern: &str, controller: &ControllerRef, mapping: &str) -> Result<Self, RouterError> {
        let methods = parse_mapping(controller.as_ref(), mapping)?;

        let verbs = if methods.is_empty() || methods.contains_key("*") {
            HTTP_METHODS.to_vec()
        } else {
            HTTP_METHODS.iter().filter(|m| methods.contains_key(m.as_str())).cloned().collect()
        };

        let route = Arc::new(RouteInfo {
            pattern: pattern.to_owned(),
            kind: RouteKind::Controller { controller: Arc::clone(controller), methods },
        });
        for method in &verbs {
            self.add_to_router(method, pattern, &route)?;
        }
        Ok(self)
    }

    /// Registers the routes a controller declares with [`ControllerType::route`](crate::controller::ControllerType::route).
    pub fn include(mut self, controller: &ControllerRef) -> Result<Self, RouterError> {
        for route in controller.routes() {
            let mapping = format!("{}:{}", route.methods.join(","), route.capability);
            self = self.add(&route.pattern, controller, &mapping)?;
        }
        Ok(self)
    }

    /// Registers a function handler for one verb, or for every verb with `"*"`.
    pub fn add_method<F>(mut self, method: &str, pattern: &str, handler: F) -> Result<Self, RouterError>
    where
        F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
    {
        let methods = if method == "*" {
            HTTP_METHODS.iter().cloned().collect::<HashSet<_>>()
        } else {
            let method = parse_method(method).ok_or_else(|| RouterError::unsupported_method(method))?;
            HashSet::from([method])
        };

        let route = Arc::new(RouteInfo {
            pattern: pattern.to_owned(),
            kind: RouteKind::Function {
                methods: methods.clone(),
                handler: Arc::new(handler),
                identity: stateless_identity::<F>(),
            },
        });
        for method in HTTP_METHODS.iter().filter(|m| methods.contains(*m)) {
            self.add_to_router(method, pattern, &route)?;
        }
        Ok(self)
    }

    method_route!(get, "GET");
    method_route!(post, "POST");
    method_route!(put, "PUT");
    method_route!(delete, "DELETE");
    method_route!(patch, "PATCH");
    method_route!(head, "HEAD");
    method_route!(options, "OPTIONS");
    method_route!(any, "*");

    /// Registers a raw handler for every verb. With `match_subpaths` everything below
    /// `pattern` is routed to it as well.
    pub fn handler<H: RawHandler>(mut self, pattern: &str, handler: H, match_subpaths: bool) -> Result<Self, RouterError> {
        let route = Arc::new(RouteInfo {
            pattern: pattern.to_owned(),
            kind: RouteKind::Raw { handler: Arc::new(handler), identity: stateless_identity::<H>() },
        });

        let pattern = if match_subpaths { join_path(&[pattern, "*"]) } else { pattern.to_owned() };
        for method in &HTTP_METHODS {
            self.add_to_router(method, &pattern, &route)?;
        }
        Ok(self)
    }

    /// Exposes every capability of a controller as `/controller/capability` with automatic
    /// routing, see [`add_auto_prefix`](Self::add_auto_prefix).
    pub fn add_auto(self, controller: &ControllerRef) -> Result<Self, RouterError> {
        self.add_auto_prefix("/", controller)
    }

    /// Exposes every capability of a controller below `prefix`.
    ///
    /// For `MainController` with capability `List` the patterns `prefix/main/list`,
    /// `prefix/Main/List` and both with a trailing `/*` are registered for every verb.
    pub fn add_auto_prefix(mut self, prefix: &str, controller: &ControllerRef) -> Result<Self, RouterError> {
        let name = controller.name();
        let name = name.strip_suffix("Controller").unwrap_or(name);
        let lower_name = name.to_lowercase();

        for capability in controller.capabilities() {
            if self.except_methods.contains(&capability) {
                continue;
            }

            let lower_capability = capability.to_lowercase();
            let pattern = join_path(&[prefix, &lower_name, &lower_capability, "*"]);
            let pattern_init = join_path(&[prefix, name, &capability, "*"]);
            let pattern_fix = join_path(&[prefix, &lower_name, &lower_capability]);
            let pattern_fix_init = join_path(&[prefix, name, &capability]);

            let methods = HashMap::from([("*".to_owned(), capability.clone())]);
            let route = Arc::new(RouteInfo {
                pattern: pattern.clone(),
                kind: RouteKind::Controller { controller: Arc::clone(controller), methods },
            });

            debug!(controller = name, capability = %capability, pattern = %pattern, "auto route");
            for method in &HTTP_METHODS {
                for p in [&pattern, &pattern_init, &pattern_fix, &pattern_fix_init] {
                    self.add_to_router(method, p, &route)?;
                }
            }
        }
        Ok(self)
    }

    /// Adds a name that automatic routing never exposes.
    pub fn except_method(mut self, name: impl Into<String>) -> Self {
        self.except_methods.push(name.into());
        self
    }

    /// Adds a filter at `position` for paths matching `pattern`.
    ///
    /// With `return_on_output` the chain stops as soon as the response has started.
    pub fn insert_filter<F>(
        mut self,
        pattern: &str,
        position: FilterPosition,
        filter: F,
        return_on_output: bool,
    ) -> Result<Self, RouterError>
    where
        F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
    {
        let folded = fold_case(&self.config, pattern);
        let filter = FilterRouter::new(pattern, &folded, Arc::new(filter), return_on_output)?;
        self.filters.push(position, filter);
        Ok(self)
    }

    pub fn build(self) -> Router {
        Router { config: Arc::new(self.config), routers: self.routers, filters: self.filters }
    }

    fn add_to_router(&mut self, method: &Method, pattern: &str, route: &Arc<RouteInfo>) -> Result<(), RouterError> {
        let pattern = fold_case(&self.config, pattern);
        self.routers.entry(method.clone()).or_default().insert(&pattern, Arc::clone(route))
    }
}

/// Parses a `verbs:Capability;..` mapping into an upper case verb to capability map.
fn parse_mapping(controller: &dyn ControllerFactory, mapping: &str) -> Result<HashMap<String, String>, RouterError> {
    let mut methods = HashMap::new();
    if mapping.is_empty() {
        return Ok(methods);
    }

    for rule in mapping.split(';') {
        let parts = rule.split(':').collect::<Vec<_>>();
        let [verbs, capability] = parts.as_slice() else {
            return Err(RouterError::invalid_mapping(rule));
        };

        for verb in verbs.split(',') {
            if verb != "*" && parse_method(verb).is_none() {
                return Err(RouterError::unsupported_method(verb));
            }
            if !controller.has_capability(capability) {
                return Err(RouterError::unknown_capability(capability, controller.name()));
            }
            methods.insert(verb.to_uppercase(), (*capability).to_owned());
        }
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::{parse_mapping, parse_method, RouteKind, Router, HTTP_METHODS};
    use crate::config::RouterConfig;
    use crate::controller::{Controller, ControllerRef, ControllerType};
    use crate::error::{HandlerResult, RouterError};
    use crate::handler::{BoxFuture, RawHandler};
    use crate::response::ResponseWriter;
    use crate::Context;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Method, Request};

    #[derive(Default)]
    struct MainController;

    impl MainController {
        async fn list(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
            Ok(())
        }
    }

    impl Controller for MainController {}

    struct Files;

    #[async_trait]
    impl RawHandler for Files {
        async fn serve_http(&self, _writer: &mut dyn ResponseWriter, _request: &Request<Bytes>) -> HandlerResult {
            Ok(())
        }
    }

    fn main_controller() -> ControllerRef {
        ControllerType::<MainController>::new().action("List", |c, ctx| Box::pin(c.list(ctx))).into_ref()
    }

    fn ok<'c>(_ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get"), Some(Method::GET));
        assert_eq!(parse_method("Options"), Some(Method::OPTIONS));
        assert_eq!(parse_method("FETCH"), None);
    }

    #[test]
    fn test_parse_mapping() {
        let controller = main_controller();
        let methods = parse_mapping(controller.as_ref(), "get,post:List;put:Put").unwrap();
        assert_eq!(methods.len(), 3);
        assert_eq!(methods["GET"], "List");
        assert_eq!(methods["POST"], "List");
        assert_eq!(methods["PUT"], "Put");

        assert!(parse_mapping(controller.as_ref(), "").unwrap().is_empty());
        assert!(matches!(parse_mapping(controller.as_ref(), "get"), Err(RouterError::InvalidMapping { .. })));
        assert!(matches!(parse_mapping(controller.as_ref(), "get:List:x"), Err(RouterError::InvalidMapping { .. })));
        assert!(matches!(parse_mapping(controller.as_ref(), "fetch:List"), Err(RouterError::UnsupportedMethod { .. })));
        assert!(matches!(parse_mapping(controller.as_ref(), "get:Missing"), Err(RouterError::UnknownCapability { .. })));
    }

    #[test]
    fn controller_with_mapping_only_in_mapped_verbs() {
        let controller = main_controller();
        let router = Router::builder(RouterConfig::default()).add("/main", &controller, "get:List").unwrap().build();

        assert!(router.find(&Method::GET, "/main").is_some());
        assert!(router.find(&Method::POST, "/main").is_none());
        assert!(router.tree(&Method::POST).is_none());
    }

    #[test]
    fn controller_without_mapping_in_all_verbs() {
        let controller = main_controller();
        let router = Router::builder(RouterConfig::default()).add("/main/:id", &controller, "").unwrap().build();

        for method in &HTTP_METHODS {
            let (route, params) = router.find(method, "/main/3").unwrap();
            assert_eq!(route.pattern(), "/main/:id");
            assert_eq!(params.get("id"), Some("3"));
        }
    }

    #[test]
    fn function_routes() {
        let router = Router::builder(RouterConfig::default())
            .get("/get", ok)
            .unwrap()
            .any("/any", ok)
            .unwrap()
            .build();

        assert!(router.find(&Method::GET, "/get").is_some());
        assert!(router.find(&Method::PUT, "/get").is_none());
        assert!(router.find(&Method::CONNECT, "/any").is_some());

        let (route, _) = router.find(&Method::GET, "/get").unwrap();
        assert!(matches!(route.kind(), RouteKind::Function { methods, .. } if methods.len() == 1));
    }

    fn other<'c>(_ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn same_function_registered_twice_keeps_one_leaf() {
        let router = Router::builder(RouterConfig::default())
            .get("/user/:name", ok)
            .unwrap()
            .get("/user/:name", ok)
            .unwrap()
            .build();
        assert_eq!(router.tree(&Method::GET).unwrap().leaf_count(), 1);

        let router = Router::builder(RouterConfig::default())
            .get("/user/:name", ok)
            .unwrap()
            .get("/user/:name", other)
            .unwrap()
            .build();
        assert_eq!(router.tree(&Method::GET).unwrap().leaf_count(), 2);
    }

    #[test]
    fn capturing_closures_are_distinct_handlers() {
        fn greeting(
            word: &'static str,
        ) -> impl for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static {
            move |ctx| Box::pin(async move { ctx.output_mut().body(word) })
        }

        let router = Router::builder(RouterConfig::default())
            .get("/greet", greeting("hi"))
            .unwrap()
            .get("/greet", greeting("hello"))
            .unwrap()
            .build();
        assert_eq!(router.tree(&Method::GET).unwrap().leaf_count(), 2);
    }

    #[test]
    fn same_raw_handler_registered_twice_keeps_one_leaf() {
        let router = Router::builder(RouterConfig::default())
            .handler("/files", Files, true)
            .unwrap()
            .handler("/files", Files, true)
            .unwrap()
            .build();

        for method in &HTTP_METHODS {
            assert_eq!(router.tree(method).unwrap().leaf_count(), 1);
        }
    }

    #[test]
    fn unsupported_function_method() {
        let result = Router::builder(RouterConfig::default()).add_method("fetch", "/x", ok);
        assert!(matches!(result, Err(RouterError::UnsupportedMethod { .. })));
    }

    #[test]
    fn raw_handler_with_subpaths() {
        let router = Router::builder(RouterConfig::default()).handler("/files", Files, true).unwrap().build();

        let (route, params) = router.find(&Method::DELETE, "/files/a/b.txt").unwrap();
        assert_eq!(route.pattern(), "/files");
        assert_eq!(params.get(":splat"), Some("a/b.txt"));
        assert!(router.find(&Method::GET, "/files").is_some());
    }

    #[test]
    fn auto_routes() {
        let controller = main_controller();
        let router = Router::builder(RouterConfig::default()).add_auto(&controller).unwrap().build();

        let (route, _) = router.find(&Method::GET, "/main/list").unwrap();
        let RouteKind::Controller { methods, .. } = route.kind() else { panic!("controller route expected") };
        assert_eq!(methods["*"], "List");

        assert!(router.find(&Method::POST, "/Main/List").is_some());
        let (_, params) = router.find(&Method::GET, "/main/list/2024/10").unwrap();
        assert_eq!(params.get(":splat"), Some("2024/10"));
        assert!(router.find(&Method::GET, "/main/get").is_some());
    }

    #[test]
    fn auto_routes_skip_except_methods() {
        let controller = main_controller();
        let router =
            Router::builder(RouterConfig::default()).except_method("List").add_auto_prefix("/admin", &controller).unwrap().build();

        assert!(router.find(&Method::GET, "/admin/main/list").is_none());
        assert!(router.find(&Method::GET, "/admin/main/post").is_some());
    }

    #[test]
    fn include_controller_routes() {
        let controller = ControllerType::<MainController>::new()
            .action("List", |c, ctx| Box::pin(c.list(ctx)))
            .route("/v1/main", &["get", "post"], "List")
            .into_ref();
        let router = Router::builder(RouterConfig::default()).include(&controller).unwrap().build();

        assert!(router.find(&Method::POST, "/v1/main").is_some());
        assert!(router.find(&Method::PUT, "/v1/main").is_none());
    }

    #[test]
    fn case_insensitive_routes() {
        let config = RouterConfig::default().case_sensitive(false);
        let router = Router::builder(config).get("/Admin/Users", ok).unwrap().build();

        assert!(router.find(&Method::GET, "/admin/users").is_some());
        assert!(router.find(&Method::GET, "/ADMIN/USERS").is_some());
        let (route, _) = router.find(&Method::GET, "/admin/users").unwrap();
        assert_eq!(route.pattern(), "/Admin/Users");
    }

    #[test]
    fn case_sensitive_routes() {
        let router = Router::builder(RouterConfig::default()).get("/Admin", ok).unwrap().build();
        assert!(router.find(&Method::GET, "/admin").is_none());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let result = Router::builder(RouterConfig::default()).get("no-slash", ok);
        assert!(matches!(result, Err(RouterError::InvalidPattern { .. })));
    }
}
