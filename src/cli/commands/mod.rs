pub mod auth;
pub mod network;
pub mod server;
pub mod user;
