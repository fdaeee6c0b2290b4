//! # Route Table
//!
//! Radix-trie route storage built on `matchit`, one trie per HTTP method.
//! Patterns accept `:name` named segments and `*name` catch-alls, which are
//! normalized to matchit syntax at registration. The table is written only
//! during the startup/bind phase and is read-only at request time.

use crate::error::{Error, Result};
use crate::middleware::Handler;
use std::collections::HashMap;

/// HTTP methods supported by the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

/// The fixed verb set used by the bulk resource registrar
pub const METHODS: [Method; 7] = [
    Method::Get,
    Method::Post,
    Method::Put,
    Method::Delete,
    Method::Patch,
    Method::Head,
    Method::Options,
];

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

impl Method {
    /// Map a hyper method onto the supported verb set
    #[must_use]
    pub fn from_hyper(m: &hyper::Method) -> Option<Self> {
        match *m {
            hyper::Method::GET => Some(Self::Get),
            hyper::Method::POST => Some(Self::Post),
            hyper::Method::PUT => Some(Self::Put),
            hyper::Method::DELETE => Some(Self::Delete),
            hyper::Method::PATCH => Some(Self::Patch),
            hyper::Method::HEAD => Some(Self::Head),
            hyper::Method::OPTIONS => Some(Self::Options),
            _ => None,
        }
    }
}

/// Index into the handler vec
type HandlerId = usize;

/// Per-method route storage plus the registered handler chains
///
/// Duplicate (method, path) registration is a bind-time error; the embedded
/// trie reports the conflict and the table surfaces it instead of letting a
/// later registration shadow an earlier one.
#[derive(Default)]
pub struct RouteTable {
    methods: HashMap<Method, matchit::Router<HandlerId>>,
    handlers: Vec<Handler>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully composed handler chain under (method, pattern)
    pub fn insert(&mut self, method: Method, pattern: &str, chain: Handler) -> Result<()> {
        let normalized = normalize_pattern(pattern);
        let id = self.handlers.len();

        let trie = self.methods.entry(method).or_default();
        trie.insert(&normalized, id).map_err(|e| match e {
            matchit::InsertError::Conflict { .. } => Error::DuplicateRoute {
                method: method.to_string(),
                pattern: pattern.to_string(),
            },
            other => Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: other.to_string(),
            },
        })?;

        self.handlers.push(chain);
        Ok(())
    }

    /// Match a request, returning the handler chain and the extracted route
    /// parameters in pattern order.
    #[must_use]
    pub fn lookup(&self, method: Method, path: &str) -> Option<(Handler, Vec<(String, String)>)> {
        let trie = self.methods.get(&method)?;
        let matched = trie.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some((self.handlers[*matched.value].clone(), params))
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether any route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Convert `:name` and `*name` segments to matchit's `{name}` / `{*name}`
fn normalize_pattern(pattern: &str) -> String {
    let mut parts = Vec::new();
    for segment in pattern.split('/') {
        if let Some(name) = segment.strip_prefix(':') {
            parts.push(format!("{{{name}}}"));
        } else if let Some(name) = segment.strip_prefix('*') {
            parts.push(format!("{{*{name}}}"));
        } else {
            parts.push(segment.to_string());
        }
    }
    parts.join("/")
}

/// Capability interface for the bulk REST registrar
///
/// Implement the verbs the resource supports; each returns the handler to
/// register, and the default `None` skips that verb. The registrar iterates
/// the fixed seven-verb set, so there is no runtime method lookup by name.
pub trait Resource {
    /// Handler for GET, if supported
    fn get(&self) -> Option<Handler> {
        None
    }
    /// Handler for POST, if supported
    fn post(&self) -> Option<Handler> {
        None
    }
    /// Handler for PUT, if supported
    fn put(&self) -> Option<Handler> {
        None
    }
    /// Handler for DELETE, if supported
    fn delete(&self) -> Option<Handler> {
        None
    }
    /// Handler for PATCH, if supported
    fn patch(&self) -> Option<Handler> {
        None
    }
    /// Handler for HEAD, if supported
    fn head(&self) -> Option<Handler> {
        None
    }
    /// Handler for OPTIONS, if supported
    fn options(&self) -> Option<Handler> {
        None
    }

    /// Dispatch table used by the registrar; not meant for overriding
    fn handler_for(&self, method: Method) -> Option<Handler> {
        match method {
            Method::Get => self.get(),
            Method::Post => self.post(),
            Method::Put => self.put(),
            Method::Delete => self.delete(),
            Method::Patch => self.patch(),
            Method::Head => self.head(),
            Method::Options => self.options(),
        }
    }
}
