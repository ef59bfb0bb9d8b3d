pub mod edge;
pub mod network;
pub mod user;

pub use edge::{EdgeRecord, EdgeVersion};
pub use network::{Generation, Network, NewNetwork};
pub use user::{NewUser, User};
