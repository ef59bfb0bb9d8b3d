use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::network::geometry::GeometryError;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Malformed description, feature, geometry or attribute. Never partially applied.
    #[error("{}", describe_validation(.message, .feature))]
    Validation { message: String, feature: Option<usize> },

    /// The network does not exist or is not visible to the caller
    #[error("Network {0} not found")]
    NotFound(i64),

    /// Store failure; the unit of work was rolled back before this was raised
    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    #[error("Action not permitted: {0}")]
    Authorization(String),
}

fn describe_validation(message: &str, feature: &Option<usize>) -> String {
    match feature {
        Some(index) => format!("feature {}: {}", index, message),
        None => message.to_string(),
    }
}

impl NetworkError {
    pub fn validation(message: impl Into<String>) -> Self {
        NetworkError::Validation { message: message.into(), feature: None }
    }

    /// Attach the index of the offending feature to a validation error
    pub fn at_feature(self, index: usize) -> Self {
        match self {
            NetworkError::Validation { message, .. } => NetworkError::Validation { message, feature: Some(index) },
            other => other,
        }
    }

    pub fn persistence(operation: &'static str) -> impl FnOnce(DatabaseError) -> NetworkError {
        move |source| NetworkError::Persistence { operation, source }
    }
}

impl From<GeometryError> for NetworkError {
    fn from(err: GeometryError) -> Self {
        NetworkError::validation(err.to_string())
    }
}
