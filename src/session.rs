//! # Session Boundary
//!
//! The engine consumes sessions through a provider interface and does not
//! implement persistence itself. The pieces here are the provider contract,
//! the per-engine [`SessionManager`] that resolves it from configuration,
//! and the pooled [`CookieAdapter`] bridging a provider's cookie reads and
//! writes to the current request/response pair.

use crate::config::SessionConfig;
use crate::cookie::CookieConfig;
use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One user session handed to handlers
pub trait Session: Send + Sync {
    /// Stable session identifier
    fn id(&self) -> &str;
    /// Read a value from the session
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value into the session
    fn set(&self, key: &str, value: String);
    /// Remove a value from the session
    fn remove(&self, key: &str);
}

/// Session persistence backend contract
///
/// Implementations live outside this crate (memory, file, redis, ...). The
/// provider reads and writes the session id cookie exclusively through the
/// supplied adapter, never touching the transport directly.
pub trait SessionProvider: Send + Sync {
    /// Resume the session named by the adapter's cookie, or create a new
    /// one and issue its id through the adapter.
    fn start(&self, cookies: &mut CookieAdapter) -> Result<Arc<dyn Session>>;

    /// Drop the session named by the adapter's cookie and clear the cookie.
    fn destroy(&self, cookies: &mut CookieAdapter);
}

/// Pending cookie mutation recorded by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CookieWrite {
    /// Issue (or re-issue) the session id cookie
    Set(String),
    /// Delete the session id cookie
    Clear,
}

/// Bridges provider cookie access to the request/response of one dispatch
///
/// The adapter is bound to the inbound cookie value at allocation and
/// buffers at most one outgoing write; the context applies that write to
/// the response (and mirrors it onto the request) after the provider call
/// returns. Instances are pooled by the manager and recycled by the
/// lifecycle wrapper at the end of every request that used one.
#[derive(Debug, Default)]
pub struct CookieAdapter {
    incoming: Option<String>,
    pending: Option<CookieWrite>,
}

impl CookieAdapter {
    fn bind(&mut self, incoming: Option<&str>) {
        self.incoming = incoming.map(ToString::to_string);
        self.pending = None;
    }

    /// The session id visible to the provider: a pending write wins over
    /// the inbound cookie value.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match &self.pending {
            Some(CookieWrite::Set(id)) => Some(id.as_str()),
            Some(CookieWrite::Clear) => None,
            None => self.incoming.as_deref(),
        }
    }

    /// Record a session id to be written to the response
    pub fn issue(&mut self, id: String) {
        self.pending = Some(CookieWrite::Set(id));
    }

    /// Record deletion of the session cookie
    pub fn clear(&mut self) {
        self.pending = Some(CookieWrite::Clear);
    }

    pub(crate) fn take_pending(&mut self) -> Option<CookieWrite> {
        self.pending.take()
    }
}

/// Per-engine session coordinator
///
/// Created lazily on the first `session_start` of an engine, from the
/// provider registered under the configured name, and reused for every
/// request after that. Owns the adapter free list.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    config: SessionConfig,
    adapters: Mutex<Vec<CookieAdapter>>,
}

impl SessionManager {
    /// Build a manager around a resolved provider
    #[must_use]
    pub fn new(provider: Arc<dyn SessionProvider>, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            adapters: Mutex::new(Vec::new()),
        }
    }

    /// Session settings this manager was configured with
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Check an adapter out of the pool, bound to the inbound cookie value
    pub(crate) fn acquire_adapter(&self, incoming: Option<&str>) -> CookieAdapter {
        let mut idle = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        let mut adapter = idle.pop().unwrap_or_default();
        adapter.bind(incoming);
        adapter
    }

    /// Return an adapter to the pool
    pub(crate) fn recycle_adapter(&self, adapter: CookieAdapter) {
        let mut idle = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(adapter);
    }

    /// Number of idle adapters (test instrumentation)
    #[must_use]
    pub fn idle_adapters(&self) -> usize {
        self.adapters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Delegate to the provider's `start`
    pub fn start(&self, cookies: &mut CookieAdapter) -> Result<Arc<dyn Session>> {
        self.provider.start(cookies)
    }

    /// Delegate to the provider's `destroy`
    pub fn destroy(&self, cookies: &mut CookieAdapter) {
        self.provider.destroy(cookies);
    }

    /// Cookie attributes for the session id cookie, derived from config
    #[must_use]
    pub fn cookie_config(&self) -> CookieConfig {
        CookieConfig {
            path: "/".to_string(),
            domain: self.config.domain.clone(),
            expires: Duration::from_secs(self.config.cookie_lifetime),
            http_only: true,
        }
    }
}
