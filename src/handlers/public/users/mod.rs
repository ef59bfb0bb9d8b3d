// handlers/public/users/mod.rs - Account creation

pub mod register; // POST /users - register a new account

pub use register::register_post;
