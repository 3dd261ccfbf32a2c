//! Controller-style handlers.
//!
//! A controller is a type implementing [`Controller`]; the router never holds controller
//! instances, it holds a [`ControllerRef`] that creates a fresh instance for every request
//! and drives it through the lifecycle:
//!
//! `init` -> `prepare` -> (`xsrf_token` -> `check_xsrf_cookie`) -> `url_mapping` ->
//! the selected method -> `render` -> `finish`
//!
//! Besides the HTTP verb methods a controller exposes named actions registered on its
//! [`ControllerType`], which route mappings such as `"get,post:List"` refer to.
//!
//! ```
//! use micro_router::controller::{Controller, ControllerFactory, ControllerType};
//! use micro_router::{Context, HandlerResult};
//! use async_trait::async_trait;
//!
//! #[derive(Default)]
//! struct UserController;
//!
//! impl UserController {
//!     async fn list(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
//!         ctx.output_mut().body("users")
//!     }
//! }
//!
//! #[async_trait]
//! impl Controller for UserController {
//!     async fn get(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.output_mut().body(id)
//!     }
//! }
//!
//! let controller = ControllerType::<UserController>::new()
//!     .action("List", |c, ctx| Box::pin(c.list(ctx)))
//!     .into_ref();
//! assert!(controller.has_capability("List"));
//! assert!(controller.has_capability("Get"));
//! ```

use crate::error::{HandlerError, HandlerResult};
use crate::handler::BoxFuture;
use crate::Context;
use async_trait::async_trait;
use http::{Method, StatusCode};
use std::sync::Arc;

/// Controller capabilities every controller has, one per HTTP verb method of [`Controller`].
pub const BUILTIN_CAPABILITIES: [&str; 7] = ["Get", "Post", "Delete", "Put", "Head", "Patch", "Options"];

/// Names never exposed by automatic routing.
pub(crate) const EXCEPT_METHODS: [&str; 35] = [
    "Init",
    "Prepare",
    "Finish",
    "Render",
    "RenderString",
    "RenderBytes",
    "Redirect",
    "Abort",
    "StopRun",
    "UrlFor",
    "ServeJson",
    "ServeJsonp",
    "ServeXml",
    "Input",
    "ParseForm",
    "GetString",
    "GetStrings",
    "GetInt",
    "GetBool",
    "GetFloat",
    "GetFile",
    "SaveToFile",
    "StartSession",
    "SetSession",
    "GetSession",
    "DelSession",
    "SessionRegenerateID",
    "DestroySession",
    "IsAjax",
    "GetSecureCookie",
    "SetSecureCookie",
    "XsrfToken",
    "CheckXsrfCookie",
    "XsrfFormHtml",
    "GetControllerAndAction",
];

/// The lifecycle hooks and verb methods of a controller.
///
/// Every method has a default: hooks do nothing and verb methods reply
/// `405 Method Not Allowed`.
#[async_trait]
pub trait Controller: Send + 'static {
    /// Receives the request before anything else, with the controller name and the method
    /// about to run.
    fn init(&mut self, _ctx: &mut Context<'_>, _controller_name: &str, _action: &str) {}

    async fn prepare(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    /// Issues the xsrf token, only called when xsrf protection is enabled.
    async fn xsrf_token(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    /// Verifies the xsrf token of POST, PUT and DELETE requests.
    async fn check_xsrf_cookie(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    fn url_mapping(&mut self) {}

    async fn get(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn post(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn delete(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn put(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn head(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn patch(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    async fn options(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        method_not_allowed(ctx)
    }

    /// Runs a named method the controller dispatches itself. `None` means the name is not
    /// handled here and the registered actions are tried next.
    async fn handler_func(&mut self, _name: &str, _ctx: &mut Context<'_>) -> Option<HandlerResult> {
        None
    }

    /// Renders the response when the selected method wrote nothing.
    async fn render(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    async fn finish(&mut self, _ctx: &mut Context<'_>) {}
}

fn method_not_allowed(ctx: &mut Context<'_>) -> HandlerResult {
    ctx.output_mut().error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Lifecycle switches taken from the router configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub enable_xsrf: bool,
    pub auto_render: bool,
}

/// A route declared by the controller itself, registered with
/// [`RouterBuilder::include`](crate::RouterBuilder::include).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRoute {
    pub pattern: String,
    pub methods: Vec<String>,
    pub capability: String,
}

/// The type-erased view of a [`ControllerType`] stored in the route table.
#[async_trait]
pub trait ControllerFactory: Send + Sync + 'static {
    /// The type name, e.g. `UserController`.
    fn name(&self) -> &str;

    /// The `/` separated module path the controller lives in.
    fn package(&self) -> &str;

    /// `package/name`, the string reverse resolution matches endpoints against.
    fn qualified_name(&self) -> String {
        match self.package() {
            "" => self.name().to_owned(),
            package => format!("{package}/{}", self.name()),
        }
    }

    fn has_capability(&self, name: &str) -> bool;

    /// The built-in verb capabilities followed by the registered actions.
    fn capabilities(&self) -> Vec<String>;

    fn routes(&self) -> &[ControllerRoute];

    /// Creates a controller and runs its lifecycle with `run_method`, either an upper case
    /// HTTP verb or a capability name.
    async fn execute(&self, ctx: &mut Context<'_>, run_method: &str, lifecycle: Lifecycle) -> HandlerResult;
}

/// A shared controller reference as stored by the router.
pub type ControllerRef = Arc<dyn ControllerFactory>;

type Action<C> = Box<dyn for<'c> Fn(&'c mut C, &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync>;

/// Describes a controller type: how to create it and which named actions it has.
pub struct ControllerType<C> {
    name: String,
    package: String,
    factory: Box<dyn Fn() -> C + Send + Sync>,
    actions: Vec<(String, Action<C>)>,
    routes: Vec<ControllerRoute>,
}

impl<C: Controller + Default> ControllerType<C> {
    pub fn new() -> Self {
        Self::with_factory(C::default)
    }
}

impl<C: Controller + Default> Default for ControllerType<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Controller> ControllerType<C> {
    /// Creates the description with a custom constructor. The name and package are taken
    /// from the Rust type path, `app::controllers::UserController` has the name
    /// `UserController` and the package `app/controllers`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<C>();
        let path = type_name.split('<').next().unwrap_or(type_name);
        let (package, name) = path.rsplit_once("::").unwrap_or(("", path));

        Self {
            name: name.to_owned(),
            package: package.replace("::", "/"),
            factory: Box::new(factory),
            actions: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the package used for reverse resolution, segments are `/` separated.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Registers a named action. A later registration with the same name replaces it.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: for<'c> Fn(&'c mut C, &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
    {
        let name = name.into();
        self.actions.retain(|(n, _)| *n != name);
        self.actions.push((name, Box::new(action)));
        self
    }

    /// Declares a route registered when the controller is included.
    pub fn route(mut self, pattern: impl Into<String>, methods: &[&str], capability: impl Into<String>) -> Self {
        self.routes.push(ControllerRoute {
            pattern: pattern.into(),
            methods: methods.iter().map(|m| (*m).to_owned()).collect(),
            capability: capability.into(),
        });
        self
    }

    pub fn into_ref(self) -> ControllerRef {
        Arc::new(self)
    }

    async fn invoke(&self, controller: &mut C, name: &str, ctx: &mut Context<'_>) -> HandlerResult {
        if let Some((_, action)) = self.actions.iter().find(|(n, _)| n == name) {
            return action(controller, ctx).await;
        }

        match name {
            "Get" => controller.get(ctx).await,
            "Post" => controller.post(ctx).await,
            "Delete" => controller.delete(ctx).await,
            "Put" => controller.put(ctx).await,
            "Head" => controller.head(ctx).await,
            "Patch" => controller.patch(ctx).await,
            "Options" => controller.options(ctx).await,
            _ => Err(HandlerError::UnknownCapability { capability: name.to_owned(), controller: self.name.clone() }),
        }
    }
}

#[async_trait]
impl<C: Controller> ControllerFactory for ControllerType<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn package(&self) -> &str {
        &self.package
    }

    fn has_capability(&self, name: &str) -> bool {
        BUILTIN_CAPABILITIES.contains(&name) || self.actions.iter().any(|(n, _)| n == name)
    }

    fn capabilities(&self) -> Vec<String> {
        let mut capabilities = BUILTIN_CAPABILITIES.iter().map(|c| (*c).to_owned()).collect::<Vec<_>>();
        for (name, _) in &self.actions {
            if !capabilities.contains(name) {
                capabilities.push(name.clone());
            }
        }
        capabilities
    }

    fn routes(&self) -> &[ControllerRoute] {
        &self.routes
    }

    async fn execute(&self, ctx: &mut Context<'_>, run_method: &str, lifecycle: Lifecycle) -> HandlerResult {
        let mut controller = (self.factory)();

        controller.init(ctx, &self.name, run_method);
        controller.prepare(ctx).await?;

        if lifecycle.enable_xsrf {
            controller.xsrf_token(ctx).await?;
            if [Method::POST, Method::DELETE, Method::PUT].contains(ctx.method()) {
                controller.check_xsrf_cookie(ctx).await?;
            }
        }

        controller.url_mapping();

        if !ctx.is_started() {
            match run_method {
                "GET" => controller.get(ctx).await?,
                "POST" => controller.post(ctx).await?,
                "DELETE" => controller.delete(ctx).await?,
                "PUT" => controller.put(ctx).await?,
                "HEAD" => controller.head(ctx).await?,
                "PATCH" => controller.patch(ctx).await?,
                "OPTIONS" => controller.options(ctx).await?,
                name => match controller.handler_func(name, ctx).await {
                    Some(result) => result?,
                    None => self.invoke(&mut controller, name, ctx).await?,
                },
            }

            if !ctx.is_started() && ctx.output().status().is_none() && lifecycle.auto_render {
                controller.render(ctx).await?;
            }
        }

        controller.finish(ctx).await;
        Ok(())
    }
}

impl<C> std::fmt::Debug for ControllerType<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerType")
            .field("name", &self.name)
            .field("package", &self.package)
            .field("actions", &self.actions.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
