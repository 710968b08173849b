//! Static viewer assets served from the `public/` directory

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

const INDEX_FILE: &str = "viewer.html";

/// Serve a GET for `uri_path` from `public_dir`.
///
/// `/` resolves to the viewer page. Every response carries the
/// cross-origin isolation headers the viewer needs; HTML is never cached
/// so a redeployed viewer takes effect immediately.
pub async fn serve_static(public_dir: &Path, uri_path: &str) -> Response<Body> {
    let Some(file_path) = resolve_path(public_dir, uri_path) else {
        return status_response(StatusCode::FORBIDDEN, "Forbidden");
    };

    match tokio::fs::read(&file_path).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&file_path)
                .first_or_octet_stream()
                .to_string();

            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header("Cross-Origin-Opener-Policy", "same-origin")
                .header("Cross-Origin-Embedder-Policy", "require-corp");

            if file_path.extension().is_some_and(|ext| ext == "html") {
                builder = builder.header(
                    header::CACHE_CONTROL,
                    "no-cache, no-store, must-revalidate",
                );
            }

            builder.body(Body::from(data)).unwrap()
        }
        Err(_) => status_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Map a request path to a file inside `public_dir`, rejecting any path
/// that would escape it.
fn resolve_path(public_dir: &Path, uri_path: &str) -> Option<PathBuf> {
    let trimmed = uri_path.trim_start_matches('/');
    let relative = if trimmed.is_empty() { INDEX_FILE } else { trimmed };

    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        warn!("path traversal attempt blocked: {}", uri_path);
        return None;
    }

    Some(public_dir.join(candidate))
}

fn status_response(status: StatusCode, message: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_to_the_viewer() {
        let resolved = resolve_path(Path::new("/srv/public"), "/").unwrap();
        assert_eq!(resolved, Path::new("/srv/public/viewer.html"));
    }

    #[test]
    fn nested_assets_resolve() {
        let resolved = resolve_path(Path::new("/srv/public"), "/js/viewer.js").unwrap();
        assert_eq!(resolved, Path::new("/srv/public/js/viewer.js"));
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(resolve_path(Path::new("/srv/public"), "/../etc/passwd").is_none());
        assert!(resolve_path(Path::new("/srv/public"), "/js/../../secret").is_none());
    }

    #[tokio::test]
    async fn serves_files_with_isolation_headers() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("viewer.html"), "<html></html>")
            .await
            .unwrap();

        let response = serve_static(dir.path(), "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Cross-Origin-Opener-Policy").unwrap(),
            "same-origin"
        );
        assert_eq!(
            response
                .headers()
                .get("Cross-Origin-Embedder-Policy")
                .unwrap(),
            "require-corp"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = serve_static(dir.path(), "/nope.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
