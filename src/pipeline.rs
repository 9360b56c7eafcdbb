//! The middleware pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Middleware`] terminated by a
//! [`Target`]. Dispatch never mutates the pipeline: the current position is a
//! [`Next`] value handed to each step, holding the middleware still to run and
//! what to call once they are exhausted.
//!
//! ```text
//! handle(req)
//!   └─ A.process(req, next[B, target])
//!        └─ B.process(req, next[target])
//!             └─ target(req)            ← scope bound, output captured
//!        ←── B sees the response
//!   ←── A sees the response
//! ```
//!
//! Because nothing request-scoped lives on the pipeline, one instance serves
//! any number of concurrent requests.

use std::future::{self, Future};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::handler::{self, BoxFuture, BoxedCallable, RequestHandler};
use crate::request::Request;
use crate::response::{IntoReply, Response, ResponseFactory};
use crate::scope::{self, Bindings};

/// One step of the chain.
///
/// Call `next.run(req)` to continue, or return a response without calling it
/// to short-circuit every later step and the target.
///
/// ```rust
/// use palisade::{BoxFuture, Error, Middleware, Next, Request, Response};
///
/// struct PoweredBy;
///
/// impl Middleware for PoweredBy {
///     fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
///         Box::pin(async move {
///             let mut response = next.run(req).await?;
///             response
///                 .headers_mut()
///                 .insert("x-powered-by", http::HeaderValue::from_static("palisade"));
///             Ok(response)
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>>;
}

// ── Target ────────────────────────────────────────────────────────────────────

/// What a pipeline calls once every middleware has passed the request on.
#[derive(Clone)]
pub enum Target {
    /// A full handler. The request is resolvable through [`scope::resolve`]
    /// while it runs.
    Handler(Arc<dyn RequestHandler>),
    /// A plain async function of `(Request, Response)`, see
    /// [`CallableHandler`](crate::CallableHandler).
    Callable(BoxedCallable),
}

impl Target {
    pub fn handler(handler: impl RequestHandler + 'static) -> Self {
        Self::Handler(Arc::new(handler))
    }

    pub fn callable<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + Send + 'static,
    {
        Self::Callable(handler::boxed(f))
    }

    fn dispatch<'a>(
        &'a self,
        factory: &'a ResponseFactory,
        req: Request,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        match self {
            Self::Handler(handler) => {
                let bindings = Bindings::new().with(req.clone());
                Box::pin(scope::run(bindings, handler.handle(req)))
            }
            Self::Callable(callable) => Box::pin(handler::invoke(callable, factory, req)),
        }
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain, from one middleware's point of view.
///
/// `Next` is `Copy`: running it again replays the remaining steps from the
/// same position, and has no effect on any other dispatch.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: Endpoint<'a>,
}

#[derive(Clone, Copy)]
enum Endpoint<'a> {
    Target {
        target: &'a Target,
        factory: &'a ResponseFactory,
    },
    /// The pipeline is itself a step of an outer chain; continue there.
    Delegate(&'a Next<'a>),
}

impl<'a> Next<'a> {
    /// Runs the remaining middleware, then the endpoint.
    pub fn run(self, req: Request) -> BoxFuture<'a, Result<Response, Error>> {
        match self.middleware.split_first() {
            Some((head, rest)) => head.process(req, Next { middleware: rest, endpoint: self.endpoint }),
            None => match self.endpoint {
                Endpoint::Target { target, factory } => target.dispatch(factory, req),
                Endpoint::Delegate(outer) => outer.run(req),
            },
        }
    }

    /// Number of middleware of this pipeline still to run before its endpoint.
    pub fn remaining(&self) -> usize {
        self.middleware.len()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    target: Option<Target>,
    factory: ResponseFactory,
    started: AtomicBool,
}

impl Pipeline {
    pub fn new(factory: ResponseFactory) -> Self {
        Self {
            middleware: Vec::new(),
            target: None,
            factory,
            started: AtomicBool::new(false),
        }
    }

    /// Appends `middleware`; it runs after every middleware already added.
    pub fn push_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Prepends `middleware`; it runs before every middleware already added.
    pub fn rise_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.insert(0, Arc::new(middleware));
        self
    }

    /// A pipeline with the same middleware and `target` as its endpoint.
    ///
    /// The returned pipeline has not dispatched yet and starts from the
    /// first middleware. Fails once this instance has handled a request.
    pub fn with_handler(&self, target: Target) -> Result<Pipeline, Error> {
        if self.has_started() {
            return Err(Error::configuration(
                "unable to change the target of a pipeline that has already dispatched",
            ));
        }
        Ok(Self {
            middleware: self.middleware.clone(),
            target: Some(target),
            factory: self.factory.clone(),
            started: AtomicBool::new(false),
        })
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn factory(&self) -> &ResponseFactory {
        &self.factory
    }
}

impl RequestHandler for Pipeline {
    fn handle(&self, req: Request) -> BoxFuture<'_, Result<Response, Error>> {
        let Some(target) = &self.target else {
            return Box::pin(future::ready(Err(Error::configuration(
                "unable to run pipeline, no target given",
            ))));
        };
        self.started.store(true, Ordering::Release);

        let next = Next {
            middleware: &self.middleware,
            endpoint: Endpoint::Target { target, factory: &self.factory },
        };
        next.run(req)
    }
}

/// Nesting: the pipeline's own middleware run, then the outer chain resumes.
impl Middleware for Pipeline {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let inner = Next {
                middleware: &self.middleware,
                endpoint: Endpoint::Delegate(&next),
            };
            inner.run(req).await
        })
    }
}
