//! Shared process plumbing for the ballot services.

pub mod logging;
pub mod metrics_server;
pub mod shutdown;

pub use logging::{init_logging, LogFormat};
pub use metrics_server::{encode_metrics, serve_metrics};
pub use shutdown::ShutdownController;
