//! The request routing and dispatch engine of the micro web framework
//!
//! This crate maps an incoming request to a handler and drives it through a fixed
//! pipeline of filter points. It does not speak HTTP on the wire: a host HTTP layer hands
//! every request, with its body already buffered, to a [`Dispatcher`] together with a
//! [`ResponseWriter`].
//!
//! # Features
//!
//! - Segment trie per HTTP verb with named, typed, regex, optional and splat placeholders
//! - Function handlers, raw handlers and controllers with a lifecycle
//! - Automatic controller routes and controller-declared routes
//! - Filters at five points of the pipeline
//! - Error pages by code and recovery of failures and panics
//! - Reverse resolution of controller endpoints into urls
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, StatusCode};
//! use micro_router::handler::BoxFuture;
//! use micro_router::{Context, Dispatcher, HandlerResult, Router, RouterConfig};
//!
//! fn hello<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
//!     Box::pin(async move {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         ctx.output_mut().body(format!("hello {name}"))
//!     })
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let router = Router::builder(RouterConfig::default()).get("/hello/:name", hello)?.build();
//! let dispatcher = Dispatcher::builder(router).build()?;
//!
//! let request = Request::builder().uri("/hello/micro").body(Bytes::new())?;
//! let response = dispatcher.call(request).await?;
//!
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.body().as_ref(), b"hello micro");
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod params;
mod utils;

pub mod controller;
pub mod exception;
pub mod filter;
pub mod handler;
pub mod hooks;
pub mod response;
pub mod router;
pub mod tree;

pub use config::{RouterConfig, RunMode};
pub use context::Context;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BoxError, HandlerError, HandlerResult, RouterError};
pub use filter::FilterPosition;
pub use params::{Params, SPLAT};
pub use response::{BufferedWriter, Output, ResponseWriter};
pub use router::{Router, RouterBuilder};
