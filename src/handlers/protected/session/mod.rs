// handlers/protected/session/mod.rs - Session introspection

pub mod whoami; // GET /auth/whoami

pub use whoami::whoami_get;
