pub mod controller;
pub mod crud;
pub mod engine;
pub mod interface;
pub mod lockout;
pub mod model;
pub mod routes;
pub mod schema;

pub use routes::auth_routes;
