//! Health-check handlers.
//!
//! | Probe | Suggested endpoint | Question |
//! |---|---|---|
//! | **Liveness** | `healthz` | Is the process alive? |
//! | **Readiness** | `readyz` | Can it serve traffic? |
//!
//! ```rust
//! use kiri::{Router, expose, health};
//!
//! let router = Router::new()
//!     .route(expose("healthz", health::liveness))
//!     .route(expose("readyz", health::readiness));
//! ```

use crate::{Request, Response};

/// Always `200 OK`, body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK`, body `"ready"`. Replace it when readiness depends on
/// downstream services.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
