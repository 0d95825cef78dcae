mod protocol;
mod routes;
mod server;
mod state;

pub use protocol::{ApiError, ErrorBody};
pub use server::{router, GatewayServer};
pub use state::AppState;
