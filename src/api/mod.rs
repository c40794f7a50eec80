mod error;
pub mod middleware;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::ApiError;
pub use server::{build_router, run, serve};
pub use state::AppState;
