//! The configured HTTP core: one pipeline, one handler, one factory.

use std::fmt;
use std::sync::Arc;

use crate::config::HttpConfig;
use crate::crypto::Encrypter;
use crate::error::Error;
use crate::handler::RequestHandler;
use crate::middleware::{CookiesMiddleware, CsrfFirewall, CsrfMiddleware, TraceMiddleware};
use crate::pipeline::{Pipeline, Target};
use crate::request::Request;
use crate::response::{Response, ResponseFactory};

/// Entry point tying configuration, middleware and the application together.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use palisade::{HttpConfig, HttpCore, Request, Response, SecretEncrypter, Target};
///
/// # async fn run() -> Result<(), palisade::Error> {
/// let mut core = HttpCore::new(HttpConfig::default(), Arc::new(SecretEncrypter::generate()))?;
/// core.set_handler(Target::callable(|_req: Request, _res: Response| async { "hello" }));
///
/// let response = core.handle(Request::get("http://localhost/").build()?).await?;
/// assert_eq!(response.body_text(), "hello");
/// # Ok(())
/// # }
/// ```
pub struct HttpCore {
    config: Arc<HttpConfig>,
    factory: ResponseFactory,
    pipeline: Pipeline,
    handler: Option<Target>,
}

impl fmt::Debug for HttpCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCore").finish_non_exhaustive()
    }
}

impl HttpCore {
    /// Validates `config` and builds the pipeline from `config.middleware`.
    pub fn new(config: HttpConfig, encrypter: Arc<dyn Encrypter>) -> Result<Self, Error> {
        config.validate()?;
        let config = Arc::new(config);
        let factory = ResponseFactory::from_config(&config)?;

        let mut pipeline = Pipeline::new(factory.clone());
        for id in &config.middleware {
            match id.as_str() {
                "trace" => pipeline.push_middleware(TraceMiddleware),
                "cookies" => pipeline
                    .push_middleware(CookiesMiddleware::new(Arc::clone(&config), Arc::clone(&encrypter))),
                "csrf" => pipeline.push_middleware(CsrfMiddleware::new(Arc::clone(&config))),
                "csrf-firewall" => pipeline.push_middleware(CsrfFirewall::new(&config, factory.clone())),
                "csrf-strict-firewall" => {
                    pipeline.push_middleware(CsrfFirewall::strict(&config, factory.clone()))
                }
                other => return Err(Error::configuration(format!("unknown middleware `{other}`"))),
            };
        }

        Ok(Self { config, factory, pipeline, handler: None })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Responses pre-populated with the configured base headers.
    pub fn factory(&self) -> &ResponseFactory {
        &self.factory
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Add application middleware with `push_middleware` / `rise_middleware`.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn set_handler(&mut self, target: Target) -> &mut Self {
        self.handler = Some(target);
        self
    }

    /// Runs `req` through the pipeline to the configured handler.
    pub async fn handle(&self, req: Request) -> Result<Response, Error> {
        let Some(handler) = &self.handler else {
            return Err(Error::configuration("unable to handle request, no handler set"));
        };
        let pipeline = self.pipeline.with_handler(handler.clone())?;
        pipeline.handle(req).await
    }
}
