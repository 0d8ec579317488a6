//! Error types
//!
//! Two families: [`MapError`] is raised while turning shapes into schemas or
//! instances into values and points at a mistake in a shape definition (or a
//! payload that does not match it). [`LookupError`] is raised by the needs
//! cache and is meant for the user. [`Diagnostic`] renders either for display.

use serde::Serialize;

/// Errors from the schema builder and value extractor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("unsupported type {ty} for field {field:?} of shape {shape}")]
    UnsupportedShape {
        shape: String,
        field: String,
        ty: String,
    },
    #[error("attribute {name:?} is defined more than once in shape {shape}")]
    NamingCollision { shape: String, name: String },
    #[error("expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
    #[error("satisfier holds variant {actual}, not {requested}")]
    WrongVariantRequested { requested: String, actual: String },
}

impl MapError {
    pub(crate) fn unsupported(shape: &str, field: &str, ty: impl ToString) -> Self {
        Self::UnsupportedShape {
            shape: shape.to_string(),
            field: field.to_string(),
            ty: ty.to_string(),
        }
    }
}

/// Errors from a needs lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("environment {env:?} does not exist")]
    EnvironmentNotFound { env: String },
    #[error("unable to fetch Encore resources, got error: {0}")]
    RemoteQueryFailed(String),
}

impl LookupError {
    /// The input attribute this error is tied to, if any.
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            Self::EnvironmentNotFound { .. } => Some("env"),
            Self::RemoteQueryFailed(_) => None,
        }
    }
}

/// Errors returned by a [`NeedsClient`](crate::needs::NeedsClient).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("env not found")]
    EnvNotFound,
    #[error("{0}")]
    Other(String),
}

/// Failure reading a data source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Map(#[from] MapError),
}

/// User facing rendering of an error, scoped to an attribute when possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl From<&LookupError> for Diagnostic {
    fn from(err: &LookupError) -> Self {
        match err {
            LookupError::EnvironmentNotFound { .. } => Self {
                summary: "Env not found".to_string(),
                detail: "The specified environment does not exist".to_string(),
                attribute: err.attribute().map(str::to_string),
            },
            LookupError::RemoteQueryFailed(_) => Self {
                summary: "Client Error".to_string(),
                detail: err.to_string(),
                attribute: None,
            },
        }
    }
}

impl From<&MapError> for Diagnostic {
    fn from(err: &MapError) -> Self {
        let summary = match err {
            MapError::UnsupportedShape { .. } => "Unsupported Type",
            MapError::NamingCollision { .. } => "Naming Collision",
            MapError::TypeMismatch { .. } => "Unexpected Value",
            MapError::WrongVariantRequested { .. } => "Wrong Variant",
        };
        Self {
            summary: summary.to_string(),
            detail: err.to_string(),
            attribute: None,
        }
    }
}

impl From<&ReadError> for Diagnostic {
    fn from(err: &ReadError) -> Self {
        match err {
            ReadError::Lookup(e) => e.into(),
            ReadError::Map(e) => e.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "{} ({}): {}", self.summary, attr, self.detail),
            None => write!(f, "{}: {}", self.summary, self.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_not_found_is_scoped_to_env() {
        let err = LookupError::EnvironmentNotFound {
            env: "ghost".to_string(),
        };
        let diag = Diagnostic::from(&err);
        assert_eq!(diag.summary, "Env not found");
        assert_eq!(diag.attribute.as_deref(), Some("env"));
        assert_eq!(diag.to_string(), "Env not found (env): The specified environment does not exist");
    }

    #[test]
    fn test_client_error_carries_message() {
        let err = LookupError::RemoteQueryFailed("connection refused".to_string());
        let diag = Diagnostic::from(&ReadError::from(err));
        assert_eq!(diag.summary, "Client Error");
        assert!(diag.detail.contains("connection refused"));
        assert!(diag.attribute.is_none());
    }
}
