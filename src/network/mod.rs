pub mod error;
pub mod feature;
pub mod geometry;
pub mod ingest;
pub mod temporal;

pub use error::NetworkError;
pub use feature::{EdgeFeature, FeatureCollection};
pub use geometry::Geometry;
pub use ingest::{parse_description, Feature, NetworkDescription};
pub use temporal::{ReplaceOutcome, TemporalEdgeStore};
