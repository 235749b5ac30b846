pub mod apps;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod upload;
pub mod views;
