mod auth;
pub mod dto;
mod repositories;
pub mod response;
mod router;

pub use auth::{AuthError, RequireToken};
pub use router::{AppState, create_router, repositories_router};
