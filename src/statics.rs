//! Static content.
//!
//! Every app has a `static` endpoint with the rule `/static/<file>`, so
//! templates and handlers can build asset URLs with [`static_url`]. Whether
//! kiri also *serves* those files depends on `Config::static_dir`; without it
//! the endpoint is build-only and a front proxy is expected to serve them.

use std::path::{Path, PathBuf};

use http::StatusCode;

use crate::error::Error;
use crate::handler::Handler;
use crate::href::url_for;
use crate::params::Args;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Expose, expose};

pub const ENDPOINT: &str = "static";
pub const RULE: &str = "/static/<file>";

/// URL of a static file, e.g. `/static/app.css`.
pub fn static_url(file: &str) -> Result<String, Error> {
    url_for(ENDPOINT, &Args::new().with("file", file))
}

/// Serves the file at `path` with a content type guessed from its
/// extension. Unreadable files are `404 Not Found`.
pub async fn static_file(path: impl AsRef<Path>) -> Response {
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            Response::builder().typed(mime.as_ref(), bytes)
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "static file unavailable");
            Response::error(StatusCode::NOT_FOUND, None)
        }
    }
}

/// The registration for the `static` endpoint.
pub(crate) fn route(dir: Option<PathBuf>) -> Expose {
    match dir {
        Some(dir) => expose(ENDPOINT, serve_from(dir)).rule(RULE).param("file"),
        None => Expose::build_only(ENDPOINT, RULE),
    }
}

fn serve_from(dir: PathBuf) -> impl Handler {
    move |req: Request| {
        let target = req
            .param("file")
            .and_then(|v| v.as_str())
            .filter(|name| is_plain_file_name(name))
            .map(|name| dir.join(name));
        async move {
            match target {
                Some(path) => static_file(path).await,
                None => Response::error(StatusCode::NOT_FOUND, None),
            }
        }
    }
}

/// Rejects names that could step outside the static directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.starts_with('.') && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_only() {
        assert!(is_plain_file_name("app.css"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(".env"));
        assert!(!is_plain_file_name("../secret"));
        assert!(!is_plain_file_name("a\\b"));
    }

    #[tokio::test]
    async fn serves_with_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.css");
        std::fs::write(&file, "body {}").unwrap();

        let res = static_file(&file).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/css"));
        assert_eq!(res.body(), b"body {}");

        let missing = static_file(dir.path().join("nope.css")).await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }
}
