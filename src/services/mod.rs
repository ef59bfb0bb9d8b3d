pub mod network_service;
pub mod user_service;

pub use network_service::NetworkService;
pub use user_service::{RegisterRequest, Token, UserError, UserService};
