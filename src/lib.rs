//! # Burner
//!
//! Request-dispatch engine for HTTP services.
//! Provides pooled per-request contexts, composable middleware, panic-safe
//! dispatch, cookie/session lifecycle, and static file serving.
//!
//! ## Architecture
//!
//! Handlers are synchronous functions over a pooled [`context::Context`];
//! the async Hyper/Tokio transport hands each collected request to the
//! blocking pool, where the dispatcher runs the middleware chain inside a
//! panic boundary and guarantees cleanup before the context is reused.
//!
//! ## Modules
//!
//! - `engine` - Public entry point: registration, registries, serve loop
//! - `dispatcher` - Per-request pipeline with panic recovery
//! - `router` - Radix-trie route table using matchit
//! - `middleware` - Interceptor composition around handlers
//! - `context` - Pooled per-request state and response writers
//! - `pool` - Context free list
//! - `request` / `response` - Collected HTTP wrappers
//! - `cookie` - Set-Cookie serialization
//! - `session` / `store` - Pluggable provider and driver boundaries
//! - `static_files` - Directory handler with ranges and gzip
//! - `config` - YAML-backed engine configuration
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod cookie;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod request;
pub mod response;
pub mod router;
pub mod session;
pub mod static_files;
pub mod store;

pub use config::{Config, Mode, SessionConfig, StoreConfig};
pub use context::Context;
pub use cookie::CookieConfig;
pub use dispatcher::{Dispatcher, PanicHandler, DEFAULT_NOT_FOUND_BODY};
pub use engine::Engine;
pub use error::{Error, Result};
pub use middleware::{around, filter, handler, Handler, Middleware};
pub use pool::ContextPool;
pub use request::Request;
pub use response::Response;
pub use router::{Method, Resource, RouteTable};
pub use session::{CookieAdapter, Session, SessionManager, SessionProvider};
pub use static_files::StaticDir;
pub use store::{Store, StoreFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
