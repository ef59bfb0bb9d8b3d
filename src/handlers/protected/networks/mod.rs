pub mod edges;
pub mod record;
pub mod upload;
pub mod utils;

pub use edges::generations as network_generations_get;
pub use edges::get as network_edges_get;
pub use record::delete as network_delete;
pub use upload::post as network_upload_post;
pub use upload::update as network_update_post;
