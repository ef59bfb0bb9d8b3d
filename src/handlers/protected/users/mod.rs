pub mod networks;
pub mod record;

pub use networks::get as user_networks_get;
pub use record::delete as user_delete;
pub use record::get as user_get;
