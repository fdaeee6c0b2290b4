//! # Request Context
//!
//! Per-request mutable state container. Contexts are pooled by the engine:
//! one is checked out per dispatch, `reset` on checkout, exclusively owned
//! by that request until the lifecycle wrapper runs `finish` and returns it
//! to the pool.

use crate::config::Mode;
use crate::cookie::{format_clear_cookie, format_set_cookie, CookieConfig};
use crate::engine::Shared;
use crate::error::Result;
use crate::request::Request;
use crate::response::{
    Response, APPLICATION_FORM, APPLICATION_JSON_UTF8, TEXT_HTML_UTF8, TEXT_PLAIN_UTF8,
};
use crate::router::Method;
use crate::session::{CookieWrite, Session, SessionManager};
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;

/// One in-flight HTTP exchange
///
/// Between `reset` and the next `reset` a context belongs to exactly one
/// request; the pool guarantees no two concurrent requests ever see the
/// same instance.
pub struct Context {
    request: Request,
    response: Response,
    params: Vec<(String, String)>,

    uses_store: bool,
    store: Option<Box<dyn Store>>,

    uses_session: bool,
    cookie_adapter: Option<crate::session::CookieAdapter>,

    cookie_defaults: CookieConfig,
    shared: Arc<Shared>,
}

impl Context {
    /// Create a fresh context bound to an engine; only the pool does this,
    /// once per pool miss.
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            request: Request::default(),
            response: Response::new(),
            params: Vec::new(),
            uses_store: false,
            store: None,
            uses_session: false,
            cookie_adapter: None,
            cookie_defaults: CookieConfig::default(),
            shared,
        }
    }

    /// Clear all per-request state; called on every pool checkout before
    /// the handler chain runs.
    pub fn reset(&mut self, request: Request, params: Vec<(String, String)>) {
        self.request = request;
        self.response = Response::new();
        self.params = params;
        self.store = None;
        self.uses_store = false;
        self.cookie_adapter = None;
        self.uses_session = false;
    }

    /// The inbound request
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the inbound request view
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The buffered response
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the buffered response
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Deployment mode of the owning engine
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.shared.config().mode
    }

    /// Look up a parameter by name: submitted form values first (query
    /// string, then urlencoded body), then route parameters. Empty string
    /// when absent in both.
    ///
    /// A form field therefore shadows a route parameter of the same name.
    #[must_use]
    pub fn param(&self, name: &str) -> String {
        if let Some(v) = self.request.form_value(name) {
            return v.to_string();
        }
        self.route_param(name).unwrap_or_default().to_string()
    }

    /// A route parameter extracted by path matching, bypassing form values
    #[must_use]
    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ==== response writers ====

    /// Write a plain-text response
    pub fn string(&mut self, status: u16, data: &str) -> Result<()> {
        // GET responses are plain text; other verbs echo the form content
        // type, matching the framework's historic behavior.
        if self.request.method == Method::Get {
            self.response.set_content_type(TEXT_PLAIN_UTF8);
        } else {
            self.response.set_content_type(APPLICATION_FORM);
        }
        self.response.status = status;
        self.response.body = data.as_bytes().to_vec();
        Ok(())
    }

    /// Write an HTML response
    pub fn html(&mut self, status: u16, html: &str) -> Result<()> {
        self.response.set_content_type(TEXT_HTML_UTF8);
        self.response.status = status;
        self.response.body = html.as_bytes().to_vec();
        Ok(())
    }

    /// Serialize `data` as the JSON response body
    pub fn json<T: Serialize>(&mut self, status: u16, data: &T) -> Result<()> {
        let body = serde_json::to_vec(data)?;
        self.response.set_content_type(APPLICATION_JSON_UTF8);
        self.response.status = status;
        self.response.body = body;
        Ok(())
    }

    /// Set a response header
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.response.set_header(key, value);
    }

    // ==== cookies ====

    /// Write a cookie using the context's default cookie configuration
    pub fn set_cookie(&mut self, key: &str, value: &str) {
        let cfg = self.cookie_defaults.clone();
        self.set_cookie_with(&cfg, key, value);
    }

    /// Write a cookie with explicit attributes
    ///
    /// The cookie lands on the outgoing response and is mirrored onto the
    /// inbound request view so the same request can read it back without a
    /// redirect round-trip.
    pub fn set_cookie_with(&mut self, cfg: &CookieConfig, key: &str, value: &str) {
        self.response.add_cookie(format_set_cookie(key, value, cfg));
        self.request.add_cookie(key, value);
    }

    /// Read a cookie from the inbound view (including own writes)
    #[must_use]
    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.request.cookie(key)
    }

    // ==== data store ====

    /// Get this request's data store, building one from the configured
    /// driver factory on first call. The lifecycle wrapper closes it.
    pub fn store(&mut self) -> Result<&mut (dyn Store + 'static)> {
        if self.store.is_none() {
            let factory = self.shared.store_factory()?;
            let store = factory(&self.shared.config().store)?;
            self.uses_store = true;
            self.store = Some(store);
        }
        self.store
            .as_deref_mut()
            .ok_or_else(|| crate::error::Error::Store {
                message: "store already closed".to_string(),
            })
    }

    /// Whether this request built a data store
    #[must_use]
    pub fn uses_store(&self) -> bool {
        self.uses_store
    }

    // ==== sessions ====

    /// Start (or resume) the session for this request
    ///
    /// The engine-wide session manager is created lazily on the first call
    /// anywhere in the engine; the per-request cookie adapter is allocated
    /// here and released by the lifecycle wrapper, never by handler code.
    pub fn session_start(&mut self) -> Result<Arc<dyn Session>> {
        let manager = self.shared.session_manager()?;

        let incoming = self
            .request
            .cookie(&manager.config().cookie_name)
            .map(ToString::to_string);
        let mut adapter = manager.acquire_adapter(incoming.as_deref());

        let session = manager.start(&mut adapter)?;
        self.apply_cookie_write(&manager, &mut adapter);

        if let Some(prev) = self.cookie_adapter.take() {
            manager.recycle_adapter(prev);
        }
        self.uses_session = true;
        self.cookie_adapter = Some(adapter);

        Ok(session)
    }

    /// Destroy the current session
    ///
    /// Tolerates being called before any session was started: it starts
    /// one first, mirroring `session_start`'s allocation, then asks the
    /// provider to drop it and clears the cookie.
    pub fn session_destroy(&mut self) -> Result<()> {
        if self.cookie_adapter.is_none() {
            self.session_start()?;
        }
        let manager = self.shared.session_manager()?;

        if let Some(mut adapter) = self.cookie_adapter.take() {
            manager.destroy(&mut adapter);
            self.apply_cookie_write(&manager, &mut adapter);
            self.cookie_adapter = Some(adapter);
        }
        Ok(())
    }

    /// Whether this request allocated a session cookie adapter
    #[must_use]
    pub fn uses_session(&self) -> bool {
        self.uses_session
    }

    /// Release the cookie adapter back to its pool
    ///
    /// Invoked only by the lifecycle wrapper; a no-op when no adapter was
    /// ever allocated for this request.
    pub(crate) fn session_end(&mut self) {
        if let Some(adapter) = self.cookie_adapter.take() {
            if let Some(manager) = self.shared.session_manager_if_init() {
                manager.recycle_adapter(adapter);
            }
        }
        self.uses_session = false;
    }

    fn apply_cookie_write(
        &mut self,
        manager: &SessionManager,
        adapter: &mut crate::session::CookieAdapter,
    ) {
        let name = manager.config().cookie_name.clone();
        match adapter.take_pending() {
            Some(CookieWrite::Set(id)) => {
                let cfg = manager.cookie_config();
                self.response.add_cookie(format_set_cookie(&name, &id, &cfg));
                self.request.add_cookie(name, id);
            }
            Some(CookieWrite::Clear) => {
                let cfg = manager.cookie_config();
                self.response.add_cookie(format_clear_cookie(&name, &cfg));
                self.request.remove_cookie(&name);
            }
            None => {}
        }
    }

    // ==== lifecycle ====

    /// Guaranteed cleanup, run by the dispatcher on every exit path.
    ///
    /// Closes the data store and releases the session adapter, in that
    /// order, both strictly before the context goes back to the pool; then
    /// yields the response.
    pub(crate) fn finish(&mut self) -> Response {
        if let Some(mut store) = self.store.take() {
            if let Err(err) = store.close() {
                tracing::warn!(error = %err, "data-store close failed during cleanup");
            }
        }
        self.uses_store = false;

        self.session_end();

        std::mem::take(&mut self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::request::Request;
    use crate::router::Method;
    use crate::store::StoreFactory;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx_for(request: Request, params: Vec<(String, String)>) -> Context {
        let mut ctx = Context::new(Shared::for_tests());
        ctx.reset(request, params);
        ctx
    }

    #[test]
    fn test_param_prefers_form_value_over_route_param() {
        let req = Request::form(Method::Post, "/user/route-value", &[("id", "form-value")]);
        let ctx = ctx_for(req, vec![("id".to_string(), "route-value".to_string())]);
        assert_eq!(ctx.param("id"), "form-value");
        assert_eq!(ctx.route_param("id"), Some("route-value"));
    }

    #[test]
    fn test_param_falls_back_to_route_then_empty() {
        let ctx = ctx_for(
            Request::get("/user/7"),
            vec![("id".to_string(), "7".to_string())],
        );
        assert_eq!(ctx.param("id"), "7");
        assert_eq!(ctx.param("missing"), "");
    }

    #[test]
    fn test_param_idempotent_across_reuse() {
        let mut ctx = ctx_for(
            Request::get("/user/1"),
            vec![("id".to_string(), "1".to_string())],
        );
        assert_eq!(ctx.param("id"), "1");
        assert_eq!(ctx.param("id"), "1");

        // simulate the pool handing the instance to another request
        ctx.reset(
            Request::get("/user/2"),
            vec![("id".to_string(), "2".to_string())],
        );
        assert_eq!(ctx.param("id"), "2");
        assert_eq!(ctx.param("id"), "2");
    }

    #[test]
    fn test_string_writer_content_types() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        ctx.string(200, "hello").unwrap();
        assert_eq!(ctx.response().content_type(), TEXT_PLAIN_UTF8);
        assert_eq!(ctx.response().body_str(), "hello");

        let mut ctx = ctx_for(Request::form(Method::Post, "/", &[]), Vec::new());
        ctx.string(200, "posted").unwrap();
        assert_eq!(ctx.response().content_type(), APPLICATION_FORM);
    }

    #[test]
    fn test_json_writer() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        ctx.json(200, &json!({"Test": "index page"})).unwrap();
        assert_eq!(ctx.response().content_type(), APPLICATION_JSON_UTF8);
        assert_eq!(ctx.response().body_str(), r#"{"Test":"index page"}"#);
    }

    #[test]
    fn test_set_cookie_defaults_and_mirror() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        ctx.set_cookie("k", "v");

        let cookies = ctx.response().cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("k=v; Path=/"));
        assert!(cookies[0].contains("HttpOnly"));

        // read-your-own-write
        assert_eq!(ctx.cookie("k"), Some("v"));
    }

    #[test]
    fn test_store_unknown_driver_is_error() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        let err = ctx.store().err().unwrap();
        assert!(matches!(err, Error::UnknownStoreDriver { .. }));
        assert!(!ctx.uses_store());
    }

    #[test]
    fn test_finish_closes_store_exactly_once() {
        struct CountingStore(Arc<AtomicUsize>);
        impl Store for CountingStore {
            fn driver(&self) -> &str {
                "counting"
            }
            fn close(&mut self) -> Result<()> {
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

        let mut ctx = Context::new(shared);
        ctx.reset(Request::get("/"), Vec::new());

        ctx.store().unwrap();
        assert!(ctx.uses_store());

        let _ = ctx.finish();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!ctx.uses_store());

        // second finish must not close again
        let _ = ctx.finish();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_end_without_session_is_noop() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        ctx.session_end();
        assert!(!ctx.uses_session());
    }

    #[test]
    fn test_session_start_unknown_provider() {
        let mut ctx = ctx_for(Request::get("/"), Vec::new());
        let err = ctx.session_start().err().unwrap();
        assert!(matches!(err, Error::UnknownSessionProvider { .. }));
    }
}
