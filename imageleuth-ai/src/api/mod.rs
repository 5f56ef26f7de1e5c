//! HTTP API handlers for imageleuth-ai

pub mod export;
pub mod health;
pub mod recognize;
pub mod rename;
pub mod results;
pub mod sessions;

pub use export::export_routes;
pub use health::health_routes;
pub use recognize::recognize_routes;
pub use rename::rename_routes;
pub use results::results_routes;
pub use sessions::session_routes;
