// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (bearer JWT + user validation)
pub mod protected;
pub mod public;
