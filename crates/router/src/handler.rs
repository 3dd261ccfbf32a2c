//! Handler and filter callbacks.
//!
//! Function handlers and filters share one callback shape: an async function taking the
//! request [`Context`] and returning a [`HandlerResult`]. Closures are boxed by hand:
//!
//! ```
//! use micro_router::{Context, HandlerResult};
//! use micro_router::handler::BoxFuture;
//!
//! fn hello<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
//!     Box::pin(async move { ctx.output_mut().body("hello world") })
//! }
//! ```

use crate::error::HandlerResult;
use crate::response::ResponseWriter;
use crate::Context;
use async_trait::async_trait;
use bytes::Bytes;
use http::Request;

pub use futures::future::BoxFuture;

/// Callback run by a function route or a filter.
pub trait FilterFunc: Send + Sync + 'static {
    fn call<'c>(&self, ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult>;
}

impl<F> FilterFunc for F
where
    F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
{
    #[inline]
    fn call<'c>(&self, ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        (self)(ctx)
    }
}

/// An opaque handler that receives the raw response sink and request, without the
/// parameter bag or the controller lifecycle.
#[async_trait]
pub trait RawHandler: Send + Sync + 'static {
    async fn serve_http(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) -> HandlerResult;
}

#[cfg(test)]
mod tests {
    use super::{BoxFuture, FilterFunc, RawHandler};
    use crate::error::HandlerResult;
    use crate::response::{BufferedWriter, ResponseWriter};
    use crate::Context;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::Request;

    fn assert_is_filter_func<F: FilterFunc>(_f: &F) {
        // no op
    }

    // pins the higher-ranked signature a bare closure cannot infer on its own
    fn filter_func<F>(f: F) -> F
    where
        F: for<'c> Fn(&'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> + Send + Sync + 'static,
    {
        f
    }

    fn hello<'c>(ctx: &'c mut Context<'_>) -> BoxFuture<'c, HandlerResult> {
        Box::pin(async move { ctx.output_mut().body("hello") })
    }

    struct Echo;

    #[async_trait]
    impl RawHandler for Echo {
        async fn serve_http(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) -> HandlerResult {
            writer.write(request.uri().path().as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn fn_item_is_filter_func() {
        assert_is_filter_func(&hello);
    }

    #[test]
    fn closure_is_filter_func() {
        let closure = filter_func(|ctx| Box::pin(async move { ctx.output_mut().body("closure") }));
        assert_is_filter_func(&closure);
    }

    #[tokio::test]
    async fn call_through_trait_object() {
        let func: Box<dyn FilterFunc> = Box::new(hello);
        let mut writer = BufferedWriter::new();
        let request = Request::builder().uri("/").body(Bytes::new()).unwrap();
        let mut ctx = Context::new(&mut writer, request, true);

        func.call(&mut ctx).await.unwrap();
        drop(ctx);
        assert_eq!(writer.body(), b"hello");
    }

    #[tokio::test]
    async fn raw_handler_writes_to_sink() {
        let mut writer = BufferedWriter::new();
        let request = Request::builder().uri("/raw/path").body(Bytes::new()).unwrap();

        Echo.serve_http(&mut writer, &request).await.unwrap();
        assert_eq!(writer.body(), b"/raw/path");
    }
}
