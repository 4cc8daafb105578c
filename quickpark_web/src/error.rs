use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quickpark::{
    application::{ErrorKind, ServiceError},
    domain::identity::IdentityError,
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

/// APIのエラー応答
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad request", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value.kind() {
            ErrorKind::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, "Unauthenticated", value.to_string())
            }
            ErrorKind::Forbidden => {
                Self::new(StatusCode::FORBIDDEN, "Forbidden", value.to_string())
            }
            ErrorKind::NotFound => Self::new(StatusCode::NOT_FOUND, "Not found", value.to_string()),
            ErrorKind::Validation => Self::bad_request(value.to_string()),
            ErrorKind::Conflict => Self::new(StatusCode::CONFLICT, "Conflict", value.to_string()),
            ErrorKind::Upstream => {
                error!("サーバーエラー: {}", value);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "The request could not be completed",
                )
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(value: IdentityError) -> Self {
        ServiceError::from(value).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use quickpark::domain::parking::ParkingError;

    use super::*;

    #[test]
    fn test_status_from_service_error() {
        let cases = [
            (ServiceError::SpotNotFound, StatusCode::NOT_FOUND),
            (
                ServiceError::Rule(ParkingError::SpotUnavailable),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Rule(ParkingError::DurationTooShort { min: 5 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::MissingFields(vec!["duration"]),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Conflict(ParkingError::SpotUnavailable),
                StatusCode::CONFLICT,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
        assert_eq!(
            ApiError::from(IdentityError::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_upstream_message_is_generic() {
        let error = ApiError::from(ServiceError::DataAccess(
            quickpark::domain::DataAccessError::ReadError("disk on fire".into()),
        ));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.message.contains("disk"));
    }
}
