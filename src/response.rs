//! # HTTP Response
//!
//! Buffered response written by handlers and converted to a hyper response
//! at the transport boundary. Keeps `Set-Cookie` values as an ordered list
//! because a single response may set several cookies.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use std::collections::HashMap;

/// `text/plain; charset=utf-8`
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
/// `text/html; charset=utf-8`
pub const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";
/// `application/json; charset=utf-8`
pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";
/// `application/x-www-form-urlencoded`
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

/// Buffered HTTP response
#[derive(Debug)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
    /// Content type
    content_type: String,
    /// Response headers (other than Content-Type and Set-Cookie)
    headers: HashMap<String, String>,
    /// Ordered Set-Cookie values
    cookies: Vec<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: Vec::new(),
            content_type: TEXT_PLAIN_UTF8.to_string(),
            headers: HashMap::new(),
            cookies: Vec::new(),
        }
    }
}

impl Response {
    /// Create an empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type
    pub fn set_content_type(&mut self, value: &str) {
        self.content_type = value.to_string();
    }

    /// Get the content type
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    /// Get a previously set header
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Append a serialized `Set-Cookie` value
    pub fn add_cookie(&mut self, set_cookie: String) {
        self.cookies.push(set_cookie);
    }

    /// All pending `Set-Cookie` values, in write order
    #[must_use]
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Body as UTF-8, for assertions
    #[must_use]
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    /// Convert to a hyper response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder().status(status);
        builder = builder.header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        for cookie in &self.cookies {
            builder = builder.header("Set-Cookie", cookie.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                hyper::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from("Internal Server Error")))
                    .expect("static fallback response")
            })
    }
}
