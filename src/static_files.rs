//! Static asset handler.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::fault;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Serves files under `root` for a route with a `{*filepath}` catch-all.
///
/// Only plain relative paths are served: `..`, absolute paths and
/// directories are all `404`.
pub fn serve_dir(root: PathBuf) -> impl Handler {
    let root: Arc<Path> = Arc::from(root);
    move |req: Request| {
        let root = Arc::clone(&root);
        async move { serve(&root, req.param("filepath").unwrap_or_default()).await }
    }
}

async fn serve(root: &Path, rel: &str) -> Response {
    let rel = Path::new(rel);
    let plain = rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !plain || rel.as_os_str().is_empty() {
        return fault::not_found();
    }

    let path = root.join(rel);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return fault::not_found(),
    }
    match tokio::fs::read(&path).await {
        Ok(bytes) => Response::builder().bytes(content_type(&path), bytes),
        Err(e) => {
            debug!(path = %path.display(), "static read failed: {e}");
            fault::not_found()
        }
    }
}

fn content_type(path: &Path) -> ContentType {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("css") => ContentType::Css,
        Some("html") => ContentType::Html,
        Some("ico") => ContentType::Ico,
        Some("js") => ContentType::Javascript,
        Some("json") => ContentType::Json,
        Some("png") => ContentType::Png,
        Some("svg") => ContentType::Svg,
        Some("txt") => ContentType::Text,
        _ => ContentType::OctetStream,
    }
}
