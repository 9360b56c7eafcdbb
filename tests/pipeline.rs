use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;
use palisade::{
    BoxFuture, CallableHandler, Error, Middleware, Next, Pipeline, Request, RequestHandler, Response,
    ResponseFactory, Target, output, scope,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around the rest of the chain.
struct Recorder {
    name: &'static str,
    log: Log,
}

impl Middleware for Recorder {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            self.log.lock().push(format!("{}-enter", self.name));
            let response = next.run(req).await;
            self.log.lock().push(format!("{}-exit", self.name));
            response
        })
    }
}

/// Answers without calling the rest of the chain.
struct Block(StatusCode);

impl Middleware for Block {
    fn process<'a>(&'a self, _req: Request, _next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move { Ok(Response::status(self.0)) })
    }
}

/// Runs the rest of the chain twice and keeps the second response.
struct Twice;

impl Middleware for Twice {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            next.run(req.clone()).await?;
            next.run(req).await
        })
    }
}

/// Logs how many middleware its continuation still holds.
struct Remaining(Log);

impl Middleware for Remaining {
    fn process<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Result<Response, Error>> {
        self.0.lock().push(next.remaining().to_string());
        next.run(req)
    }
}

fn request() -> Request {
    Request::get("http://example.com/").build().unwrap()
}

fn recorded_target(log: &Log) -> Target {
    let log = Arc::clone(log);
    Target::callable(move |_req: Request, _res: Response| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push("H".to_owned());
            "handled"
        }
    })
}

#[tokio::test]
async fn middleware_wraps_the_target_in_order() {
    let log = Log::default();
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline
        .push_middleware(Recorder { name: "A", log: Arc::clone(&log) })
        .push_middleware(Recorder { name: "B", log: Arc::clone(&log) });

    let response = pipeline
        .with_handler(recorded_target(&log))
        .unwrap()
        .handle(request())
        .await
        .unwrap();

    assert_eq!(response.body_text(), "handled");
    assert_eq!(*log.lock(), ["A-enter", "B-enter", "H", "B-exit", "A-exit"]);
}

#[tokio::test]
async fn rise_middleware_runs_first() {
    let log = Log::default();
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline
        .push_middleware(Recorder { name: "A", log: Arc::clone(&log) })
        .rise_middleware(Recorder { name: "B", log: Arc::clone(&log) });

    pipeline.with_handler(recorded_target(&log)).unwrap().handle(request()).await.unwrap();
    assert_eq!(*log.lock(), ["B-enter", "A-enter", "H", "A-exit", "B-exit"]);
}

#[tokio::test]
async fn short_circuit_skips_later_steps_and_target() {
    let log = Log::default();
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline
        .push_middleware(Recorder { name: "A", log: Arc::clone(&log) })
        .push_middleware(Block(StatusCode::FORBIDDEN))
        .push_middleware(Recorder { name: "C", log: Arc::clone(&log) });

    let response = pipeline
        .with_handler(recorded_target(&log))
        .unwrap()
        .handle(request())
        .await
        .unwrap();

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(*log.lock(), ["A-enter", "A-exit"]);
}

#[tokio::test]
async fn next_can_be_replayed() {
    let log = Log::default();
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline
        .push_middleware(Twice)
        .push_middleware(Recorder { name: "B", log: Arc::clone(&log) });

    pipeline.with_handler(recorded_target(&log)).unwrap().handle(request()).await.unwrap();
    assert_eq!(*log.lock(), ["B-enter", "H", "B-exit", "B-enter", "H", "B-exit"]);
}

#[tokio::test]
async fn continuation_counts_down_to_the_target() {
    let log = Log::default();
    let mut inner = Pipeline::new(ResponseFactory::default());
    inner.push_middleware(Remaining(Arc::clone(&log)));

    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline
        .push_middleware(Remaining(Arc::clone(&log)))
        .push_middleware(inner)
        .push_middleware(Remaining(Arc::clone(&log)));

    pipeline.with_handler(recorded_target(&log)).unwrap().handle(request()).await.unwrap();
    assert_eq!(*log.lock(), ["2", "0", "0", "H"]);
}

#[tokio::test]
async fn dispatch_without_target_fails() {
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline.push_middleware(Block(StatusCode::OK));
    let err = pipeline.handle(request()).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn retargeting_restarts_from_the_first_middleware() {
    let log = Log::default();
    let mut base = Pipeline::new(ResponseFactory::default());
    base.push_middleware(Recorder { name: "A", log: Arc::clone(&log) });

    let first = base.with_handler(recorded_target(&log)).unwrap();
    let second = first.with_handler(recorded_target(&log)).unwrap();
    second.handle(request()).await.unwrap();
    assert_eq!(*log.lock(), ["A-enter", "H", "A-exit"]);

    assert!(second.with_handler(recorded_target(&log)).is_err());
    assert!(first.with_handler(recorded_target(&log)).is_ok());
}

#[tokio::test]
async fn nested_pipeline_runs_inside_the_outer_chain() {
    let log = Log::default();
    let mut inner = Pipeline::new(ResponseFactory::default());
    inner.push_middleware(Recorder { name: "inner", log: Arc::clone(&log) });

    let mut outer = Pipeline::new(ResponseFactory::default());
    outer
        .push_middleware(Recorder { name: "outer", log: Arc::clone(&log) })
        .push_middleware(inner)
        .push_middleware(Recorder { name: "last", log: Arc::clone(&log) });

    outer.with_handler(recorded_target(&log)).unwrap().handle(request()).await.unwrap();
    assert_eq!(
        *log.lock(),
        ["outer-enter", "inner-enter", "last-enter", "H", "last-exit", "inner-exit", "outer-exit"]
    );
}

#[tokio::test]
async fn nested_output_is_captured_in_write_order() {
    output::scope(async {
        let before = output::level();
        let pipeline = Pipeline::new(ResponseFactory::default())
            .with_handler(Target::callable(|_req: Request, _res: Response| async {
                output::start();
                output::echo("y");
                output::start();
                output::echo("x");
            }))
            .unwrap();

        let response = pipeline.handle(request()).await.unwrap();
        assert_eq!(response.body_text(), "yx");
        assert_eq!(output::level(), before);
    })
    .await;
}

#[tokio::test]
async fn unclosed_levels_follow_the_returned_text() {
    output::scope(async {
        output::start();
        let before = output::level();
        let pipeline = Pipeline::new(ResponseFactory::default())
            .with_handler(Target::callable(|_req: Request, _res: Response| async {
                output::start();
                output::start();
                output::echo("x");
                "y"
            }))
            .unwrap();

        let response = pipeline.handle(request()).await.unwrap();
        assert_eq!(response.body_text(), "yx");
        assert_eq!(output::level(), before);
    })
    .await;
}

#[tokio::test]
async fn json_status_field_sets_the_status() {
    let pipeline = Pipeline::new(ResponseFactory::default())
        .with_handler(Target::callable(|_req: Request, _res: Response| async {
            serde_json::json!({ "status": 404, "message": "not found" })
        }))
        .unwrap();

    let response = pipeline.handle(request()).await.unwrap();
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.header("content-type"), Some("application/json"));
}

#[derive(Debug, thiserror::Error)]
#[error("application failure")]
struct AppError;

#[tokio::test]
async fn target_errors_pass_through_untouched() {
    output::scope(async {
        let before = output::level();
        let log = Log::default();
        let mut pipeline = Pipeline::new(ResponseFactory::default());
        pipeline.push_middleware(Recorder { name: "A", log: Arc::clone(&log) });
        let pipeline = pipeline
            .with_handler(Target::callable(|_req: Request, _res: Response| async {
                output::echo("discarded");
                Err::<String, _>(AppError)
            }))
            .unwrap();

        let err = pipeline.handle(request()).await.unwrap_err();
        let Error::Handler(source) = err else { panic!("expected a handler error") };
        assert!(source.downcast_ref::<AppError>().is_some());
        assert_eq!(output::level(), before);
        assert_eq!(*log.lock(), ["A-enter", "A-exit"]);
    })
    .await;
}

#[tokio::test]
async fn handler_targets_resolve_the_request() {
    struct Path;

    impl RequestHandler for Path {
        fn handle(&self, _req: Request) -> BoxFuture<'_, Result<Response, Error>> {
            Box::pin(async {
                let path = scope::resolve::<Request>().map(|r| r.uri().path().to_owned());
                Ok(Response::text(path.unwrap_or_default()))
            })
        }
    }

    let pipeline = Pipeline::new(ResponseFactory::default())
        .with_handler(Target::handler(Path))
        .unwrap();
    let response = pipeline
        .handle(Request::get("http://example.com/scoped").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.body_text(), "/scoped");
}

#[tokio::test]
async fn callable_handler_matches_callable_target() {
    let handler = CallableHandler::new(
        |_req: Request, _res: Response| async {
            output::echo("!");
            "same"
        },
        ResponseFactory::default(),
    );
    let pipeline = Pipeline::new(ResponseFactory::default())
        .with_handler(Target::handler(handler.clone()))
        .unwrap();

    let direct = handler.handle(request()).await.unwrap();
    let piped = pipeline.handle(request()).await.unwrap();
    assert_eq!(direct.body_text(), "same!");
    assert_eq!(piped.body_text(), "same!");
}

#[tokio::test]
async fn concurrent_dispatch_does_not_mix_responses() {
    let mut pipeline = Pipeline::new(ResponseFactory::default());
    pipeline.push_middleware(Recorder { name: "A", log: Log::default() });
    let pipeline = Arc::new(
        pipeline
            .with_handler(Target::callable(|req: Request, _res: Response| async move {
                let path = req.uri().path().to_owned();
                output::echo(format!("<{path}>"));
                tokio::task::yield_now().await;
                let scoped = scope::resolve::<Request>().map(|r| r.uri().path().to_owned());
                format!("{path}:{}", scoped.unwrap_or_default())
            }))
            .unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let req = Request::get(&format!("http://example.com/{i}")).build().unwrap();
                (i, pipeline.handle(req).await.unwrap())
            })
        })
        .collect();

    for task in tasks {
        let (i, response) = task.await.unwrap();
        assert_eq!(response.body_text(), format!("/{i}:/{i}</{i}>"));
    }
}
