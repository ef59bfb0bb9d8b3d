// handlers/public/auth/mod.rs - Token acquisition

pub mod login; // POST /auth/login - exchange email and password for a JWT

pub use login::login_post;
