//! # Cookie Configuration
//!
//! Value object describing how outgoing cookies are built, plus the
//! `Set-Cookie` serialization used by the context and the session layer.

use chrono::Utc;
use std::time::Duration;

/// Attributes applied to cookies written through a context
///
/// Immutable per call; each context carries a default instance which can be
/// overridden per `set_cookie_with` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    /// Cookie path attribute
    pub path: String,
    /// Cookie domain attribute; empty means no restriction
    pub domain: String,
    /// Lifetime from now; zero produces a browser-session cookie
    pub expires: Duration,
    /// Whether the cookie is hidden from client-side scripts
    pub http_only: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: String::new(),
            expires: Duration::from_secs(60 * 60 * 24),
            http_only: true,
        }
    }
}

impl CookieConfig {
    /// A config producing an already-expired cookie, used to clear one
    #[must_use]
    pub fn expired() -> Self {
        Self {
            expires: Duration::from_secs(0),
            ..Self::default()
        }
    }
}

/// Serialize one `Set-Cookie` header value from a config
///
/// A zero expiry duration omits the `Expires` attribute entirely, producing
/// a browser-session cookie.
#[must_use]
pub fn format_set_cookie(key: &str, value: &str, cfg: &CookieConfig) -> String {
    let mut out = format!("{key}={value}");

    if !cfg.path.is_empty() {
        out.push_str("; Path=");
        out.push_str(&cfg.path);
    }
    if !cfg.domain.is_empty() {
        out.push_str("; Domain=");
        out.push_str(&cfg.domain);
    }
    if !cfg.expires.is_zero() {
        let expires = Utc::now() + chrono::Duration::seconds(cfg.expires.as_secs() as i64);
        out.push_str("; Expires=");
        out.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
    }
    if cfg.http_only {
        out.push_str("; HttpOnly");
    }

    out
}

/// Serialize a `Set-Cookie` value that deletes the named cookie
#[must_use]
pub fn format_clear_cookie(key: &str, cfg: &CookieConfig) -> String {
    let mut out = format!("{key}=");
    if !cfg.path.is_empty() {
        out.push_str("; Path=");
        out.push_str(&cfg.path);
    }
    if !cfg.domain.is_empty() {
        out.push_str("; Domain=");
        out.push_str(&cfg.domain);
    }
    out.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    if cfg.http_only {
        out.push_str("; HttpOnly");
    }
    out
}
