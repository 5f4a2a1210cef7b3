pub mod cases;
pub mod config;
pub mod enhancer;
pub mod service;
pub mod telemetry;
pub mod workflow;

pub use config::ServiceConfig;
pub use service::{AppState, build_router, create_app};
pub use workflow::{create_session_runner, load_scoring_tables};
