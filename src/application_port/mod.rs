mod access_guard;
mod auth_service;

pub use access_guard::*;
pub use auth_service::*;
