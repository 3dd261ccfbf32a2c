use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use micro_router::controller::{Controller, ControllerType};
use micro_router::exception::ErrorPages;
use micro_router::handler::BoxFuture;
use micro_router::{Context, Dispatcher, FilterPosition, HandlerResult, Router, RouterConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Default)]
struct UserController;

impl UserController {
    async fn profile(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        let id = ctx.param("id").unwrap_or("anonymous").to_owned();
        ctx.output_mut().body(format!("profile of {id}\r\n"))
    }
}

#[async_trait]
impl Controller for UserController {
    async fn get(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        let id = ctx.param("id").unwrap_or("anonymous").to_owned();
        ctx.output_mut().body(format!("user {id}\r\n"))
    }
}

fn hello<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
    Box::pin(async move {
        let name = ctx.param("name").unwrap_or("world").to_owned();
        ctx.output_mut().body(format!("hello {name}\r\n"))
    })
}

// requests to /admin without an `x-token` header never reach the route lookup
fn require_token<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
    Box::pin(async move {
        if ctx.headers().contains_key("x-token") {
            return Ok(());
        }
        ctx.output_mut().error(StatusCode::UNAUTHORIZED, "missing token")
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let users = ControllerType::<UserController>::new().action("Profile", |c, ctx| Box::pin(c.profile(ctx))).into_ref();

    let router = Router::builder(RouterConfig::default())
        .get("/hello/:name", hello)?
        .add("/user/:id([0-9]+)", &users, "get:Get")?
        .add("/user/:id([0-9]+)/profile", &users, "get:Profile")?
        .add("/admin/users", &users, "*:Get")?
        .insert_filter("/admin/*", FilterPosition::BeforeRouter, require_token, true)?
        .build();

    info!(url = %router.url_for("UserController.Profile", &["id", "42"]), "reverse resolved");

    let pages = ErrorPages::new().page("404", |ctx| {
        Box::pin(async move {
            let path = ctx.path().to_owned();
            ctx.output_mut().body(format!("nothing at {path}\r\n"))
        })
    });
    let dispatcher = Dispatcher::builder(router).exceptions(pages).build()?;

    for (method, uri) in [
        (Method::GET, "/hello/micro"),
        (Method::GET, "/user/7"),
        (Method::GET, "/user/7/profile"),
        (Method::GET, "/user/seven"),
        (Method::POST, "/admin/users"),
    ] {
        let request = Request::builder().method(method).uri(uri).body(Bytes::new())?;
        let response = dispatcher.call(request).await?;
        info!(uri, status = %response.status(), body = ?response.body(), "dispatched");
    }

    Ok(())
}
