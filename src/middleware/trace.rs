//! Per-request tracing span with method, path, status and latency.

use std::time::Instant;

use tracing::{Instrument, error, info, info_span};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::pipeline::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Copy, Debug, Default)]
pub struct TraceMiddleware;

impl Middleware for TraceMiddleware {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        let span = info_span!("request", method = %req.method(), path = req.uri().path());
        Box::pin(
            async move {
                let started = Instant::now();
                match next.run(req).await {
                    Ok(response) => {
                        info!(
                            status = response.status_code().as_u16(),
                            latency_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                            "request completed"
                        );
                        Ok(response)
                    }
                    Err(e) => {
                        error!(error = %e, "request failed");
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }
}
