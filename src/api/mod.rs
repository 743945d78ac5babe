pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{build_router, MetricsServer};
