//! Route-layer response envelope
//!
//! Handlers return `{ success, data | message, error? }` bodies with a status
//! code. Validation problems map to 400, missing entities to 404 and
//! everything else to 500.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use type_mapping::{Row, RowSet};

use crate::errors::QueryHausError;

/// JSON body sent back by route handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failure(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error,
        }
    }
}

/// Status code plus body, ready for the HTTP layer
pub type Reply<T> = (u16, ApiResponse<T>);

pub fn ok<T>(data: T) -> Reply<T> {
    (200, ApiResponse::ok(data))
}

pub fn created<T>(data: T) -> Reply<T> {
    (201, ApiResponse::ok(data))
}

/// Failures a route handler reports to its caller
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: QueryHausError,
    },
}

impl ApiError {
    pub fn internal(message: impl Into<String>, source: QueryHausError) -> Self {
        ApiError::Internal {
            message: message.into(),
            source,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Internal { .. } => 500,
        }
    }

    /// Status and envelope for this error. Internal errors carry the
    /// underlying error text for diagnostics.
    pub fn into_reply<T>(self) -> Reply<T> {
        let status = self.status_code();
        let body = match self {
            ApiError::Validation(message) | ApiError::NotFound(message) => {
                ApiResponse::failure(message, None)
            }
            ApiError::Internal { message, source } => {
                ApiResponse::failure(message, Some(source.to_string()))
            }
        };
        (status, body)
    }
}

impl From<QueryHausError> for ApiError {
    fn from(error: QueryHausError) -> Self {
        match error {
            QueryHausError::InvalidStatement(e) => ApiError::Validation(e.to_string()),
            other => ApiError::internal("Internal server error", other),
        }
    }
}

/// First row of a result, or a 404 naming the missing entity
pub fn first_row(rows: RowSet, entity: &str) -> Result<Row, ApiError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", entity)))
}

/// Turn a handler result into a reply
pub fn respond<T>(result: Result<Reply<T>, ApiError>) -> Reply<T> {
    result.unwrap_or_else(ApiError::into_reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use serde_json::json;
    use type_mapping::TypeMappingError;

    #[test]
    fn test_success_envelope_shape() {
        let (status, body) = created(json!({"id": 12}));
        assert_eq!(status, 201);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": true, "data": {"id": 12}})
        );
    }

    #[test]
    fn test_not_found() {
        let result = first_row(Vec::new(), "Guest");
        let (status, body): Reply<Row> = respond(result.map(ok));
        assert_eq!(status, 404);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": false, "message": "Guest not found"})
        );
    }

    #[test]
    fn test_invalid_statement_is_a_validation_error() {
        let error: ApiError =
            QueryHausError::InvalidStatement(TypeMappingError::InvalidParameterName("x y".into()))
                .into();
        assert_eq!(error.status_code(), 400);
    }

    #[test]
    fn test_internal_error_carries_detail() {
        let error: ApiError =
            QueryHausError::QueryExecution(DriverError::Other("deadlock victim".into())).into();
        let (status, body): Reply<()> = error.into_reply();
        assert_eq!(status, 500);
        assert_eq!(body.message.as_deref(), Some("Internal server error"));
        assert!(body.error.unwrap().contains("deadlock victim"));
    }
}
