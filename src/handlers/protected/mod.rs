// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here runs behind jwt_auth_middleware and validate_user_middleware,
// so handlers can extract `Actor` and `CurrentUser` from request extensions.
pub mod networks;
pub mod session;
pub mod users;
