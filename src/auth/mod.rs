pub mod claims;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod service;
pub mod session;
pub mod store;

pub use handlers::router;
