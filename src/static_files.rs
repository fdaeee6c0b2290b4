//! # Static Files
//!
//! Directory-backed handler registered under a catch-all route. Serves
//! files relative to a root, honors single-range `Range` requests, and
//! gzip-compresses text-like content when the client accepts it. Traversal
//! outside the root is answered with the standard not-found body.

use crate::context::Context;
use crate::dispatcher::DEFAULT_NOT_FOUND_BODY;
use crate::error::Result;
use crate::middleware::Handler;
use crate::response::TEXT_PLAIN_UTF8;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Handler factory serving one directory tree
pub struct StaticDir {
    root: PathBuf,
    strip_segments: usize,
}

/// Outcome of parsing a `Range` header against a known body length
#[derive(Debug, PartialEq, Eq)]
enum Range {
    /// No (usable) range requested; serve the whole body
    Full,
    /// Byte slice `[start, end]`, inclusive, already clamped to the body
    Slice(u64, u64),
    /// Syntactically valid but unsatisfiable for this body
    Unsatisfiable,
}

impl StaticDir {
    /// Serve files under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            strip_segments: 0,
        }
    }

    /// Drop the first `n` path segments of the request path before joining
    /// it onto the root, so `/assets/css/site.css` with one stripped
    /// segment reads `root/css/site.css`.
    #[must_use]
    pub fn strip_segments(mut self, n: usize) -> Self {
        self.strip_segments = n;
        self
    }

    /// Convert into a route handler
    #[must_use]
    pub fn into_handler(self) -> Handler {
        Arc::new(move |ctx: &mut Context| {
            let relative = stripped_path(&ctx.request().path, self.strip_segments);

            let Some(file_path) = resolve(&self.root, &relative) else {
                return not_found(ctx);
            };
            let Ok(contents) = std::fs::read(&file_path) else {
                return not_found(ctx);
            };

            let mime = mime_for(&file_path);
            ctx.response_mut().set_content_type(mime);
            ctx.response_mut().set_header("Accept-Ranges", "bytes");

            let total = contents.len() as u64;
            let range = ctx
                .request()
                .header("Range")
                .map_or(Range::Full, |h| parse_range(h, total));

            match range {
                Range::Slice(start, end) => {
                    ctx.response_mut().set_header(
                        "Content-Range",
                        &format!("bytes {start}-{end}/{total}"),
                    );
                    ctx.response_mut().status = 206;
                    #[allow(clippy::cast_possible_truncation)]
                    let slice = contents[start as usize..=end as usize].to_vec();
                    ctx.response_mut().body = slice;
                    Ok(())
                }
                Range::Unsatisfiable => {
                    ctx.response_mut()
                        .set_header("Content-Range", &format!("bytes */{total}"));
                    ctx.response_mut().status = 416;
                    ctx.response_mut().body = Vec::new();
                    Ok(())
                }
                Range::Full => {
                    let accepts_gzip = ctx
                        .request()
                        .header("Accept-Encoding")
                        .is_some_and(|enc| enc.split(',').any(|e| e.trim() == "gzip"));

                    if accepts_gzip && compressible(mime) {
                        if let Ok(compressed) = gzip(&contents) {
                            ctx.response_mut().set_header("Content-Encoding", "gzip");
                            ctx.response_mut().set_header("Vary", "Accept-Encoding");
                            ctx.response_mut().status = 200;
                            ctx.response_mut().body = compressed;
                            return Ok(());
                        }
                    }
                    ctx.response_mut().status = 200;
                    ctx.response_mut().body = contents;
                    Ok(())
                }
            }
        })
    }
}

fn not_found(ctx: &mut Context) -> Result<()> {
    ctx.response_mut().set_content_type(TEXT_PLAIN_UTF8);
    ctx.response_mut().status = 404;
    ctx.response_mut().body = DEFAULT_NOT_FOUND_BODY.as_bytes().to_vec();
    Ok(())
}

/// Drop the first `n` non-empty segments of a request path
fn stripped_path(path: &str, n: usize) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .skip(n)
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a request-relative path onto the root, rejecting traversal
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) => {}
            _ => return None,
        }
    }
    Some(root.join(candidate))
}

/// Parse a single-range `Range: bytes=a-b` header against `total` bytes
fn parse_range(header: &str, total: u64) -> Range {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return Range::Full;
    };
    // multi-range requests fall back to the full body
    if spec.contains(',') {
        return Range::Full;
    }
    let Some((start_s, end_s)) = spec.split_once('-') else {
        return Range::Full;
    };

    if total == 0 {
        return Range::Unsatisfiable;
    }

    match (start_s.is_empty(), end_s.is_empty()) {
        // bytes=-N: final N bytes
        (true, false) => match end_s.parse::<u64>() {
            Ok(0) | Err(_) => Range::Unsatisfiable,
            Ok(n) => {
                let n = n.min(total);
                Range::Slice(total - n, total - 1)
            }
        },
        // bytes=N-: from N to the end
        (false, true) => match start_s.parse::<u64>() {
            Ok(start) if start < total => Range::Slice(start, total - 1),
            Ok(_) => Range::Unsatisfiable,
            Err(_) => Range::Full,
        },
        // bytes=N-M
        (false, false) => match (start_s.parse::<u64>(), end_s.parse::<u64>()) {
            (Ok(start), Ok(end)) if start <= end && start < total => {
                Range::Slice(start, end.min(total - 1))
            }
            (Ok(_), Ok(_)) => Range::Unsatisfiable,
            _ => Range::Full,
        },
        (true, true) => Range::Full,
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Content type by file extension, defaulting to octet-stream
fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Whether a content type is worth compressing
fn compressible(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.starts_with("application/json")
        || mime.starts_with("application/javascript")
        || mime.starts_with("application/xml")
        || mime.starts_with("image/svg+xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::engine::Shared;
    use crate::request::Request;
    use std::fs;

    fn serve(dir: &Path, strip: usize, request: Request) -> crate::response::Response {
        let h = StaticDir::new(dir).strip_segments(strip).into_handler();
        let mut ctx = Context::new(Shared::for_tests());
        ctx.reset(request, Vec::new());
        h(&mut ctx).unwrap();
        std::mem::take(ctx.response_mut())
    }

    #[test]
    fn test_serves_file_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("site.css"), "body { color: red }").unwrap();

        let resp = serve(dir.path(), 1, Request::get("/assets/site.css"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type(), "text/css; charset=utf-8");
        assert_eq!(resp.body_str(), "body { color: red }");
    }

    #[test]
    fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let resp = serve(dir.path(), 1, Request::get("/assets/missing.css"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body_str(), DEFAULT_NOT_FOUND_BODY);
    }

    #[test]
    fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inside.txt"), "ok").unwrap();

        let resp = serve(dir.path(), 1, Request::get("/assets/../assets/inside.txt"));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_byte_range_slice() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "0123456789").unwrap();

        let mut req = Request::get("/assets/data.txt");
        req.set_header("Range", "bytes=2-5");
        let resp = serve(dir.path(), 1, req);

        assert_eq!(resp.status, 206);
        assert_eq!(resp.body_str(), "2345");
        assert_eq!(resp.header("Content-Range"), Some("bytes 2-5/10"));
    }

    #[test]
    fn test_open_ended_and_suffix_ranges() {
        assert_eq!(parse_range("bytes=7-", 10), Range::Slice(7, 9));
        assert_eq!(parse_range("bytes=-3", 10), Range::Slice(7, 9));
        assert_eq!(parse_range("bytes=0-99", 10), Range::Slice(0, 9));
    }

    #[test]
    fn test_unsatisfiable_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "0123456789").unwrap();

        let mut req = Request::get("/assets/data.txt");
        req.set_header("Range", "bytes=50-60");
        let resp = serve(dir.path(), 1, req);

        assert_eq!(resp.status, 416);
        assert_eq!(resp.header("Content-Range"), Some("bytes */10"));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_gzip_when_accepted_and_compressible() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), "aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();

        let mut req = Request::get("/assets/big.txt");
        req.set_header("Accept-Encoding", "gzip, deflate");
        let resp = serve(dir.path(), 1, req);

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Encoding"), Some("gzip"));
        assert_eq!(resp.header("Vary"), Some("Accept-Encoding"));
        // gzip magic bytes
        assert_eq!(&resp.body[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_no_gzip_for_binary_types() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("img.png"), [0u8; 16]).unwrap();

        let mut req = Request::get("/assets/img.png");
        req.set_header("Accept-Encoding", "gzip");
        let resp = serve(dir.path(), 1, req);

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Encoding"), None);
    }

    #[test]
    fn test_range_request_skips_compression() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "0123456789").unwrap();

        let mut req = Request::get("/assets/data.txt");
        req.set_header("Accept-Encoding", "gzip");
        req.set_header("Range", "bytes=0-3");
        let resp = serve(dir.path(), 1, req);

        assert_eq!(resp.status, 206);
        assert_eq!(resp.header("Content-Encoding"), None);
        assert_eq!(resp.body_str(), "0123");
    }

    #[test]
    fn test_stripped_path() {
        assert_eq!(stripped_path("/assets/css/site.css", 1), "css/site.css");
        assert_eq!(stripped_path("/a/b/c", 2), "c");
        assert_eq!(stripped_path("/a", 1), "");
    }
}
