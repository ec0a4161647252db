mod handlers;
mod routes;
mod types;
mod ws;

pub use handlers::ApiState;
pub use routes::create_router;
pub use types::*;
