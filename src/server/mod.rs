pub mod config;
pub mod metrics;
mod requests_logging;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use server::{make_app, run_server, serve};
pub use state::ServerState;
