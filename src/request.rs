//! # HTTP Request
//!
//! Collected-body request wrapper. Query string, urlencoded form fields and
//! cookies are parsed up front so handlers get cheap synchronous accessors.

use crate::error::Result;
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use std::collections::HashMap;

/// One inbound HTTP request as seen by handlers
///
/// The transport body is collected before dispatch, so every accessor here
/// is synchronous.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Parsed query parameters
    query_params: HashMap<String, String>,
    /// Request headers
    headers: hyper::HeaderMap,
    /// Request body (collected)
    body: Option<Bytes>,
    /// Urlencoded form fields from the body, when the content type says so
    form: HashMap<String, String>,
    /// Parsed Cookie header, plus any read-your-own-write mirrors
    cookies: HashMap<String, String>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::Get,
            path: "/".to_string(),
            query_string: None,
            query_params: HashMap::new(),
            headers: hyper::HeaderMap::new(),
            body: None,
            form: HashMap::new(),
            cookies: HashMap::new(),
        }
    }
}

impl Request {
    /// Create a request manually (tests and direct dispatch)
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let query_params = parse_query_string(query_string.as_deref());

        let mut headers = hyper::HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        let mut req = Self {
            method,
            path,
            query_string,
            query_params,
            headers,
            body,
            form: HashMap::new(),
            cookies: HashMap::new(),
        };
        req.form = req.parse_form_body();
        req.cookies = req.parse_cookie_header();
        req
    }

    /// Convenience constructor for a bodyless request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, HashMap::new(), None)
    }

    /// Convenience constructor for a urlencoded form submission
    pub fn form(method: Method, path: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let headers = HashMap::from([(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )]);
        Self::new(method, path, headers, Some(Bytes::from(body)))
    }

    /// Create from a hyper request, collecting the body under a size limit
    pub async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from_hyper(req.method()).unwrap_or(Method::Get);

        let uri = req.uri();
        let path = uri.path().to_string();
        let query_string = uri.query().map(String::from);
        let query_params = parse_query_string(query_string.as_deref());

        let headers = req.headers().clone();
        if let Some(len) = headers.get(hyper::header::CONTENT_LENGTH) {
            if let Some(content_len) = len.to_str().ok().and_then(|s| s.parse::<usize>().ok()) {
                if content_len > max_body_size {
                    return Err(crate::error::Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: content_len,
                    });
                }
            }
        }

        let body = match BodyExt::collect(req.into_body()).await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.len() > max_body_size {
                    return Err(crate::error::Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: bytes.len(),
                    });
                }
                Some(bytes)
            }
            Err(_) => None,
        };

        let mut req = Self {
            method,
            path,
            query_string,
            query_params,
            headers,
            body,
            form: HashMap::new(),
            cookies: HashMap::new(),
        };
        req.form = req.parse_form_body();
        req.cookies = req.parse_cookie_header();
        Ok(req)
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Look up a submitted value by name: query parameters first, then
    /// urlencoded body fields. Returns `None` when absent in both.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(name)
            .or_else(|| self.form.get(name))
            .map(String::as_str)
    }

    /// Get a cookie value from the inbound view
    ///
    /// Cookies written through the context are mirrored here, so a handler
    /// can read its own write without a redirect round-trip.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Mirror an outgoing cookie onto the inbound view
    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// Drop a cookie from the inbound view
    pub fn remove_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    /// Get query parameters as a map
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_ref().map(|b| b.as_ref())
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    fn parse_form_body(&self) -> HashMap<String, String> {
        let is_form = self
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if !is_form {
            return HashMap::new();
        }
        match self.body_str() {
            Some(body) => parse_query_string(Some(body)),
            None => HashMap::new(),
        }
    }

    fn parse_cookie_header(&self) -> HashMap<String, String> {
        let Some(raw) = self.header("cookie") else {
            return HashMap::new();
        };
        raw.split(';')
            .filter_map(|pair| {
                let (k, v) = pair.trim().split_once('=')?;
                Some((k.to_string(), v.to_string()))
            })
            .collect()
    }
}

/// Parse query string into a map
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter_map(|pair| {
                    let mut parts = pair.splitn(2, '=');
                    let key = parts.next()?;
                    if key.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("");
                    Some((url_decode(key), url_decode(value)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Basic URL decoding
fn url_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '+' => result.push(' '),
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() == 2 {
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        result.push(byte as char);
                    } else {
                        result.push('%');
                        result.push_str(&hex);
                    }
                } else {
                    result.push('%');
                    result.push_str(&hex);
                }
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string_simple() {
        let result = parse_query_string(Some("page=1&limit=10"));
        assert_eq!(result.get("page"), Some(&"1".to_string()));
        assert_eq!(result.get("limit"), Some(&"10".to_string()));
    }

    #[test]
    fn test_parse_query_string_url_encoded() {
        let result = parse_query_string(Some("name=John+Doe&city=New%20York"));
        assert_eq!(result.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(result.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("100%25"), "100%");
    }

    #[test]
    fn test_query_split_from_path() {
        let req = Request::get("/search?q=gas&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query_string(), Some("q=gas&page=2"));
        assert_eq!(req.form_value("q"), Some("gas"));
    }

    #[test]
    fn test_form_body_parsed_when_urlencoded() {
        let req = Request::form(Method::Post, "/submit", &[("Test", "POSTDATA")]);
        assert_eq!(req.form_value("Test"), Some("POSTDATA"));
    }

    #[test]
    fn test_form_body_ignored_without_content_type() {
        let req = Request::new(
            Method::Post,
            "/submit",
            HashMap::new(),
            Some(Bytes::from("Test=POSTDATA")),
        );
        assert_eq!(req.form_value("Test"), None);
    }

    #[test]
    fn test_query_wins_over_body_field() {
        let body = Bytes::from("name=body");
        let headers = HashMap::from([(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )]);
        let req = Request::new(Method::Post, "/x?name=query", headers, Some(body));
        assert_eq!(req.form_value("name"), Some("query"));
    }

    #[test]
    fn test_cookie_header_parsing() {
        let headers = HashMap::from([("cookie".to_string(), "a=1; b=2".to_string())]);
        let req = Request::new(Method::Get, "/", headers, None);
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
        assert_eq!(req.cookie("c"), None);
    }

    #[test]
    fn test_cookie_mirror() {
        let mut req = Request::get("/");
        assert_eq!(req.cookie("sid"), None);
        req.add_cookie("sid", "abc");
        assert_eq!(req.cookie("sid"), Some("abc"));
    }
}
