//! # Dispatcher
//!
//! The per-request pipeline: route lookup, pooled context checkout, global
//! middleware, the handler chain inside a panic boundary, guaranteed
//! cleanup, and context release. Every request passes through here exactly
//! once, whether it matches a route, falls through to the not-found
//! handler, or panics.

use crate::config::Mode;
use crate::context::Context;
use crate::error::Result;
use crate::middleware::{compose, handler, Handler, Middleware};
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Method, RouteTable};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Body of the built-in not-found response
pub const DEFAULT_NOT_FOUND_BODY: &str = "Page Not Found.";

/// Body served for recovered panics outside development mode
const PANIC_BODY_PROD: &str = "Sorry, something went wrong.";

/// Recovery hook invoked after a handler chain panics
///
/// Receives the context (response cleared of the partial write is up to
/// the hook) and the stringified panic payload.
pub type PanicHandler = Arc<dyn Fn(&mut Context, &str) -> Result<()> + Send + Sync>;

/// Routes plus the surrounding request pipeline
pub struct Dispatcher {
    routes: RouteTable,
    middlewares: Vec<Middleware>,
    not_found: Handler,
    panic_handler: PanicHandler,
    pool: Arc<ContextPool>,
}

impl Dispatcher {
    pub(crate) fn new(pool: Arc<ContextPool>) -> Self {
        Self {
            routes: RouteTable::new(),
            middlewares: Vec::new(),
            not_found: default_not_found(),
            panic_handler: default_panic_handler(),
            pool,
        }
    }

    /// Register a route; per-route middlewares are composed around the
    /// handler here, once, at bind time.
    pub fn bind(
        &mut self,
        method: Method,
        pattern: &str,
        h: Handler,
        middlewares: Vec<Middleware>,
    ) -> Result<()> {
        let chain = compose(&middlewares, h);
        self.routes.insert(method, pattern, chain)
    }

    /// Append a global middleware; it wraps every route registered on this
    /// dispatcher, including the not-found handler.
    pub fn use_middleware(&mut self, mw: Middleware) {
        self.middlewares.push(mw);
    }

    /// Replace the not-found handler
    pub fn set_not_found_handler(&mut self, h: Handler) {
        self.not_found = h;
    }

    /// Replace the panic recovery hook
    pub fn set_panic_handler(&mut self, h: PanicHandler) {
        self.panic_handler = h;
    }

    /// Number of registered routes
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Run one request through the full pipeline and produce its response
    pub fn dispatch(&self, request: Request) -> Response {
        let (chain, params) = match self.routes.lookup(request.method, &request.path) {
            Some((chain, params)) => (chain, params),
            None => (self.not_found.clone(), Vec::new()),
        };
        self.run(request, params, &chain)
    }

    /// Lifecycle wrapper: checkout, reset, panic-guarded chain, cleanup,
    /// release. Cleanup and release run on every exit path, panics
    /// included.
    fn run(&self, request: Request, params: Vec<(String, String)>, chain: &Handler) -> Response {
        let mut ctx = self.pool.acquire();
        ctx.reset(request, params);

        // `Around` constructors run user code too, so composition happens
        // inside the boundary as well
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let wrapped = compose(&self.middlewares, chain.clone());
            wrapped(&mut ctx)
        }));

        match outcome {
            Ok(_result) => {
                // handler-level Err is not transformed; whatever the chain
                // wrote to the response is what goes out
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                let recover = self.panic_handler.clone();
                let recovery =
                    catch_unwind(AssertUnwindSafe(|| recover(&mut ctx, &detail)));
                if recovery.is_err() || matches!(recovery, Ok(Err(_))) {
                    tracing::error!("panic handler failed, serving bare 500");
                    let resp = ctx.response_mut();
                    resp.status = 500;
                    resp.body = PANIC_BODY_PROD.as_bytes().to_vec();
                }
            }
        }

        let response = ctx.finish();
        self.pool.release(ctx);
        response
    }
}

/// Built-in 404 handler
pub(crate) fn default_not_found() -> Handler {
    handler(|ctx| ctx.string(404, DEFAULT_NOT_FOUND_BODY))
}

/// Built-in panic recovery: log, then serve a 500 whose body carries the
/// panic detail only in development mode.
pub(crate) fn default_panic_handler() -> PanicHandler {
    Arc::new(|ctx: &mut Context, detail: &str| {
        tracing::error!(detail, "handler panicked");
        let body = match ctx.mode() {
            Mode::Dev => format!("500 Internal Server Error: {detail}"),
            Mode::Prod => PANIC_BODY_PROD.to_string(),
        };
        let resp = ctx.response_mut();
        resp.status = 500;
        resp.set_content_type(crate::response::TEXT_PLAIN_UTF8);
        resp.body = body.into_bytes();
        Ok(())
    })
}

/// Stringify a panic payload; `&str` and `String` payloads keep their text
fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Shared;
    use crate::error::Error;
    use crate::middleware::filter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(ContextPool::new(Shared::for_tests())))
    }

    #[test]
    fn test_matched_route_runs_handler() {
        let mut d = dispatcher();
        d.bind(
            Method::Get,
            "/",
            handler(|ctx| ctx.string(200, "indexpage")),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_str(), "indexpage");
    }

    #[test]
    fn test_unmatched_route_serves_default_404() {
        let d = dispatcher();
        let resp = d.dispatch(Request::get("/nowhere"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body_str(), DEFAULT_NOT_FOUND_BODY);
    }

    #[test]
    fn test_custom_not_found_handler() {
        let mut d = dispatcher();
        d.set_not_found_handler(handler(|ctx| ctx.html(404, "<h1>gone</h1>")));

        let resp = d.dispatch(Request::get("/nowhere"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body_str(), "<h1>gone</h1>");
    }

    #[test]
    fn test_global_middleware_wraps_not_found() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();

        let mut d = dispatcher();
        d.use_middleware(filter(move |_ctx| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let _ = d.dispatch(Request::get("/nowhere"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_route_params_reach_handler() {
        let mut d = dispatcher();
        d.bind(
            Method::Get,
            "/user/:id",
            handler(|ctx| {
                let id = ctx.param("id");
                ctx.string(200, &id)
            }),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/user/42"));
        assert_eq!(resp.body_str(), "42");
    }

    #[test]
    fn test_per_route_middleware_short_circuit() {
        // guards the route on the submitted form field "Test"
        let guard = crate::middleware::around(|next: Handler| {
            Arc::new(move |ctx: &mut Context| {
                if ctx.param("Test") == "Go" {
                    next(ctx)
                } else {
                    ctx.string(403, "request forbidden")
                }
            })
        });

        let mut d = dispatcher();
        d.bind(
            Method::Post,
            "/guarded",
            handler(|ctx| ctx.string(200, "let through")),
            vec![guard.clone()],
        )
        .unwrap();
        d.bind(
            Method::Get,
            "/guarded",
            handler(|ctx| ctx.string(200, "let through")),
            vec![guard],
        )
        .unwrap();

        let resp = d.dispatch(Request::form(Method::Post, "/guarded", &[("Test", "Go")]));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_str(), "let through");

        let resp = d.dispatch(Request::form(Method::Post, "/guarded", &[("Test", "DontGo")]));
        assert_eq!(resp.status, 403);
        assert_eq!(resp.body_str(), "request forbidden");

        // query-string fields feed the same lookup
        let resp = d.dispatch(Request::get("/guarded?Test=Go"));
        assert_eq!(resp.status, 200);

        let resp = d.dispatch(Request::get("/guarded"));
        assert_eq!(resp.status, 403);
    }

    #[test]
    fn test_panic_recovered_with_500() {
        let mut d = dispatcher();
        d.bind(
            Method::Get,
            "/boom",
            handler(|_ctx| panic!("kaboom")),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/boom"));
        assert_eq!(resp.status, 500);
        // test shared config runs in dev mode, so the detail is included
        assert!(resp.body_str().contains("kaboom"));

        // the dispatcher survives and keeps serving
        let resp = d.dispatch(Request::get("/nowhere"));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_custom_panic_handler() {
        let seen = Arc::new(Mutex::new(String::new()));
        let s = seen.clone();

        let mut d = dispatcher();
        d.set_panic_handler(Arc::new(move |ctx: &mut Context, detail: &str| {
            *s.lock().unwrap() = detail.to_string();
            ctx.string(503, "custom recovery")
        }));
        d.bind(
            Method::Get,
            "/boom",
            handler(|_ctx| panic!("named detail")),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/boom"));
        assert_eq!(resp.status, 503);
        assert_eq!(resp.body_str(), "custom recovery");
        assert_eq!(*seen.lock().unwrap(), "named detail");
    }

    #[test]
    fn test_panicking_panic_handler_still_responds() {
        let mut d = dispatcher();
        d.set_panic_handler(Arc::new(|_ctx: &mut Context, _detail: &str| {
            panic!("recovery panicked too")
        }));
        d.bind(
            Method::Get,
            "/boom",
            handler(|_ctx| panic!("original")),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/boom"));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body_str(), PANIC_BODY_PROD);
    }

    #[test]
    fn test_handler_error_is_not_transformed() {
        let mut d = dispatcher();
        d.bind(
            Method::Get,
            "/fail",
            handler(|ctx| {
                ctx.string(200, "written before error")?;
                Err(Error::handler("late failure"))
            }),
            Vec::new(),
        )
        .unwrap();

        // the partial write is what goes out
        let resp = d.dispatch(Request::get("/fail"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_str(), "written before error");
    }

    #[test]
    fn test_panicking_middleware_constructor_recovered() {
        let pool = Arc::new(ContextPool::new(Shared::for_tests()));
        let mut d = Dispatcher::new(pool.clone());
        d.use_middleware(crate::middleware::around(|_next: Handler| {
            panic!("constructor boom")
        }));
        d.bind(
            Method::Get,
            "/",
            handler(|ctx| ctx.string(200, "ok")),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/"));
        assert_eq!(resp.status, 500);
        assert!(resp.body_str().contains("constructor boom"));

        // the context still went through cleanup and back to the pool
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_store_closed_even_when_handler_panics() {
        use crate::config::Config;
        use crate::store::{Store, StoreFactory};

        struct CountingStore(Arc<AtomicUsize>);
        impl Store for CountingStore {
            fn driver(&self) -> &str {
                "counting"
            }
            fn close(&mut self) -> crate::error::Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let closes = Arc::new(AtomicUsize::new(0));
        let c = closes.clone();
        let factory: StoreFactory =
            Arc::new(move |_| Ok(Box::new(CountingStore(c.clone())) as Box<dyn Store>));

        let mut config = Config::default();
        config.store.driver = "counting".to_string();
        let shared = Shared::for_tests_with(config);
        shared.register_store_driver("counting", factory);

        let mut d = Dispatcher::new(Arc::new(ContextPool::new(shared)));
        d.bind(
            Method::Get,
            "/crash",
            handler(|ctx| {
                ctx.store()?;
                panic!("after store open")
            }),
            Vec::new(),
        )
        .unwrap();

        let resp = d.dispatch(Request::get("/crash"));
        assert_eq!(resp.status, 500);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_dispatches_never_share_a_context() {
        let pool = Arc::new(ContextPool::new(Shared::for_tests()));
        let mut d = Dispatcher::new(pool.clone());
        d.bind(
            Method::Get,
            "/user/:id",
            handler(|ctx| {
                let id = ctx.param("id");
                ctx.string(200, &id)
            }),
            Vec::new(),
        )
        .unwrap();
        let d = Arc::new(d);

        let threads = 8;
        let iterations = 50;
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let d = d.clone();
                std::thread::spawn(move || {
                    for i in 0..iterations {
                        let id = format!("{t}-{i}");
                        let resp = d.dispatch(Request::get(format!("/user/{id}")));
                        assert_eq!(resp.body_str(), id);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        // never more live contexts than concurrent requests
        assert!(pool.created() <= threads);
        assert_eq!(pool.idle(), pool.created());
    }

    #[test]
    fn test_context_returned_to_pool_after_panic() {
        let pool = Arc::new(ContextPool::new(Shared::for_tests()));
        let mut d = Dispatcher::new(pool.clone());
        d.bind(
            Method::Get,
            "/boom",
            handler(|_ctx| panic!("boom")),
            Vec::new(),
        )
        .unwrap();

        let _ = d.dispatch(Request::get("/boom"));
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 1);

        let _ = d.dispatch(Request::get("/boom"));
        assert_eq!(pool.created(), 1, "context must be reused after a panic");
    }
}
