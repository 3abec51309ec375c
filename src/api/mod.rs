//! OpenAQ API HTTP surface: service routes and the request middleware stack

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use middleware::{in_allowed_list, RateLimitSummary};
pub use routes::create_router;
pub use types::*;
