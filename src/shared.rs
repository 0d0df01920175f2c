//! Static file serving.
//!
//! A scope with a shared directory serves files below it under
//! `/shared/...` URLs, checked before route matching. [`send_file`] is the
//! handler-level counterpart for serving a single file from disk.

use std::path::{Component, Path, PathBuf};

use crate::error::HttpError;
use crate::http::{Response, StatusCode};
use crate::reply::Reply;

/// URL prefix under which a scope's shared directory is exposed.
pub const SHARED_PREFIX: &str = "/shared/";

/// Guesses a `Content-Type` from a file extension.
pub fn mime_of(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// A scope's shared directory, resolved against inbound `/shared/...` paths.
#[derive(Debug, Clone)]
pub(crate) struct SharedDir {
    root: PathBuf,
}

impl SharedDir {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Serves the file an inbound path points at, or `None` when the path is
    /// not under the shared prefix, escapes the root, or names no file.
    pub(crate) async fn try_serve(&self, path: &str) -> Option<Response> {
        let relative = path.strip_prefix(SHARED_PREFIX)?;
        let relative = Path::new(relative);
        // Reject anything that could climb out of the root.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        let full = self.root.join(relative);
        let data = tokio::fs::read(&full).await.ok()?;
        Some(
            Response::new(StatusCode::OK)
                .header("Content-Type", mime_of(&full))
                .body_bytes(data),
        )
    }
}

/// Reads a file and turns it into a reply with a guessed `Content-Type`.
///
/// # Errors
///
/// A 404 [`HttpError`] when the file cannot be read.
pub async fn send_file(path: impl AsRef<Path>) -> Result<Reply, HttpError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path)
        .await
        .map_err(|_| HttpError::new(StatusCode::NOT_FOUND, format!("{} not found", path.display())))?;
    Ok(Reply::body(data).with_header("Content-Type", mime_of(path)))
}

/// Like [`send_file`], but marks the reply as a download with the file's name.
pub async fn send_attachment(path: impl AsRef<Path>) -> Result<Reply, HttpError> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok(send_file(path).await?.with_header("Content-Disposition", disposition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(name: &str, contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        (dir, path)
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_of(Path::new("a/style.css")), "text/css");
        assert_eq!(mime_of(Path::new("index.HTML")), "text/html");
        assert_eq!(mime_of(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn serves_file_under_prefix() {
        let (dir, _) = fixture("hello.txt", b"hi there");
        let shared = SharedDir::new(dir.path().to_path_buf());

        let response = shared.try_serve("/shared/hello.txt").await.unwrap();
        assert_eq!(response.text(), "hi there");
        assert_eq!(response.headers().get("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path().to_path_buf());
        assert!(shared.try_serve("/shared/nope.txt").await.is_none());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (dir, _) = fixture("secret.txt", b"secret");
        let shared = SharedDir::new(dir.path().join("sub"));
        assert!(shared.try_serve("/shared/../secret.txt").await.is_none());
    }

    #[tokio::test]
    async fn non_shared_path_is_none() {
        let (dir, _) = fixture("hello.txt", b"hi");
        let shared = SharedDir::new(dir.path().to_path_buf());
        assert!(shared.try_serve("/hello.txt").await.is_none());
    }

    #[tokio::test]
    async fn send_file_reads_and_types() {
        let (_dir, path) = fixture("page.html", b"<h1>hi</h1>");
        let reply = send_file(&path).await.unwrap();
        let response = reply.into_response();
        assert_eq!(response.headers().get("content-type"), Some("text/html"));
        assert_eq!(response.text(), "<h1>hi</h1>");
    }

    #[tokio::test]
    async fn send_file_missing_is_404() {
        let err = send_file("/definitely/not/here.txt").await.unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn attachment_sets_disposition() {
        let (_dir, path) = fixture("report.pdf", b"%PDF");
        let response = send_attachment(&path).await.unwrap().into_response();
        assert_eq!(
            response.headers().get("content-disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );
    }
}
