//! Request handlers and the plain-function adapter.
//!
//! # How plain functions are stored
//!
//! A pipeline target is either a full [`RequestHandler`] or a plain async
//! function of the request and a default response. Functions of different
//! concrete types live behind one trait object (`dyn ErasedCallable`):
//!
//! ```text
//! async fn index(req: Request, res: Response) -> impl IntoReply { … }
//!        ↓ Target::callable(index) / CallableHandler::new(index, factory)
//! Arc::new(FnHandler(index))                ← stored as BoxedCallable
//!        ↓  at request time
//! invoke(callable, factory, req)
//!        ├─ default response from the factory
//!        ├─ scope::run binds (Request, Response)
//!        ├─ output::capture opens a buffer level
//!        └─ Reply::into_response normalizes the result
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::output;
use crate::request::Request;
use crate::response::{IntoReply, Reply, Response, ResponseFactory};
use crate::scope::{self, Bindings};

/// A heap-allocated, type-erased future.
///
/// `'a` lets a future borrow the handler or middleware that produced it, so
/// the chain can run on references instead of cloning every step.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that turns a request into a response.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, req: Request) -> BoxFuture<'_, Result<Response, Error>>;
}

impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    fn handle(&self, req: Request) -> BoxFuture<'_, Result<Response, Error>> {
        (**self).handle(req)
    }
}

// ── Type erasure ──────────────────────────────────────────────────────────────

/// Internal dispatch interface for plain functions.
///
/// `#[doc(hidden)] pub` because it appears in the public
/// [`Target`](crate::Target) enum; nothing outside the crate implements it.
#[doc(hidden)]
pub trait ErasedCallable {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Reply, Error>>;
}

#[doc(hidden)]
pub type BoxedCallable = Arc<dyn ErasedCallable + Send + Sync + 'static>;

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedCallable for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<Reply, Error>> {
        let fut = (self.0)(req, res);
        Box::pin(async move { fut.await.into_reply() })
    }
}

pub(crate) fn boxed<F, Fut, R>(f: F) -> BoxedCallable
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Runs a plain function against a fresh default response.
///
/// The request and the default response are resolvable through
/// [`scope::resolve`] while the function runs. Output echoed during the call
/// is appended after the returned content; the buffer stack is restored
/// whether the function succeeds, fails or is cancelled.
pub(crate) async fn invoke(
    callable: &BoxedCallable,
    factory: &ResponseFactory,
    req: Request,
) -> Result<Response, Error> {
    let default = factory.create(StatusCode::OK);
    let bindings = Bindings::new().with(req.clone()).with(default.clone());
    let call = callable.call(req, default.clone());

    let (reply, output) = scope::run(bindings, output::capture(call)).await;
    reply?.into_response(default, &output)
}

// ── CallableHandler ───────────────────────────────────────────────────────────

/// Adapts a plain async function to [`RequestHandler`].
///
/// ```rust
/// use palisade::{CallableHandler, Request, Response, ResponseFactory, output};
///
/// let handler = CallableHandler::new(
///     |_req: Request, _res: Response| async {
///         output::echo("printed ");
///         "returned"
///     },
///     ResponseFactory::default(),
/// );
/// ```
///
/// The response body is `"returned printed "`: returned content first, then
/// whatever the function echoed.
#[derive(Clone)]
pub struct CallableHandler {
    callable: BoxedCallable,
    factory: ResponseFactory,
}

impl CallableHandler {
    pub fn new<F, Fut, R>(f: F, factory: ResponseFactory) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + Send + 'static,
    {
        Self { callable: boxed(f), factory }
    }
}

impl RequestHandler for CallableHandler {
    fn handle(&self, req: Request) -> BoxFuture<'_, Result<Response, Error>> {
        Box::pin(invoke(&self.callable, &self.factory, req))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;
    use http::header::{CONTENT_TYPE, HeaderValue};

    use super::*;

    fn factory() -> ResponseFactory {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=UTF-8"));
        ResponseFactory::new(headers)
    }

    fn request() -> Request {
        Request::get("http://example.com/").build().unwrap()
    }

    #[tokio::test]
    async fn returned_text_then_echoed_output() {
        let handler = CallableHandler::new(
            |_req: Request, _res: Response| async {
                output::echo("hello!");
                "world "
            },
            factory(),
        );

        let response = handler.handle(request()).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.body_text(), "world hello!");
        assert_eq!(response.header("content-type"), Some("text/html; charset=UTF-8"));
    }

    #[tokio::test]
    async fn request_and_response_are_scoped_during_the_call() {
        let handler = CallableHandler::new(
            |_req: Request, _res: Response| async {
                let req = scope::resolve::<Request>().map(|r| r.uri().to_string());
                let has_response = scope::has::<Response>();
                format!("{req:?} {has_response}")
            },
            factory(),
        );

        let response = handler.handle(request()).await.unwrap();
        assert_eq!(response.body_text(), r#"Some("http://example.com/") true"#);
        assert!(!scope::has::<Request>());
    }

    #[tokio::test]
    async fn handler_may_edit_its_default_response() {
        let handler = CallableHandler::new(
            |_req: Request, mut res: Response| async move {
                res.set_status(StatusCode::ACCEPTED);
                res.write("edited");
                res
            },
            factory(),
        );

        let response = handler.handle(request()).await.unwrap();
        assert_eq!(response.status_code(), StatusCode::ACCEPTED);
        assert_eq!(response.body_text(), "edited");
    }

    #[tokio::test]
    async fn errors_restore_the_buffer_depth() {
        output::scope(async {
            output::start();
            let handler = CallableHandler::new(
                |_req: Request, _res: Response| async {
                    output::start();
                    output::echo("partial");
                    Err::<(), _>(std::io::Error::other("broken"))
                },
                factory(),
            );

            let err = handler.handle(request()).await.unwrap_err();
            assert_eq!(err.to_string(), "broken");
            assert_eq!(output::level(), 1);
        })
        .await;
    }
}
