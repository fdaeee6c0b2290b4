//! # Middleware System
//!
//! Interceptors composed around a terminal handler. A middleware is one of
//! a closed set of two shapes, normalized at registration time:
//!
//! - `Around`: given the next handler, produce a new handler. Runs logic
//!   before and/or after forwarding, or short-circuits with its own
//!   response.
//! - `Filter`: a plain handler run before the rest of the chain; an `Err`
//!   aborts the chain and surfaces that error.
//!
//! Composition is right-to-left, so the first registered middleware is
//! outermost: it executes first and, if it forwards, completes last.

use crate::context::Context;
use crate::error::Result;
use std::sync::Arc;

/// Terminal handler signature shared by routes and middleware
pub type Handler = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;

/// Wrap a closure into a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One interceptor in canonical form
///
/// The set is closed: anything that is not representable as one of these
/// two variants cannot be registered, which moves the "unknown middleware
/// type" failure of looser designs to compile time.
#[derive(Clone)]
pub enum Middleware {
    /// Full interceptor: receives the next handler, returns the wrapped one
    Around(Arc<dyn Fn(Handler) -> Handler + Send + Sync>),
    /// Plain handler with abort-on-error forwarding semantics
    Filter(Handler),
}

impl Middleware {
    /// Apply this middleware around `next`
    #[must_use]
    pub fn wrap(&self, next: Handler) -> Handler {
        match self {
            Self::Around(f) => f(next),
            Self::Filter(m) => {
                let m = m.clone();
                Arc::new(move |ctx: &mut Context| {
                    m(ctx)?;
                    next(ctx)
                })
            }
        }
    }
}

/// Build an `Around` middleware from a wrapping closure
pub fn around<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Middleware::Around(Arc::new(f))
}

/// Build a `Filter` middleware from a plain handler closure
pub fn filter<F>(f: F) -> Middleware
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Middleware::Filter(Arc::new(f))
}

impl From<Handler> for Middleware {
    fn from(h: Handler) -> Self {
        Self::Filter(h)
    }
}

/// Compose `[m0, m1, ..., mn]` around `terminal`, yielding
/// `m0(m1(...mn(terminal)...))` so that `m0` is outermost.
#[must_use]
pub fn compose(middlewares: &[Middleware], terminal: Handler) -> Handler {
    let mut chained = terminal;
    for mw in middlewares.iter().rev() {
        chained = mw.wrap(chained);
    }
    chained
}
