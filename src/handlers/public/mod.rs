// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition and self-registration. Everything here validates its
// own input since there is no trusted user context.
pub mod auth;
pub mod users;
