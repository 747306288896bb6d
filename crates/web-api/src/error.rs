use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// 升级请求被拒绝时返回的 HTTP 错误
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let status = match &error {
            ApplicationError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApplicationError::Busy | ApplicationError::PersistFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApplicationError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
                DomainError::RoomNotFound
                | DomainError::QuestionNotFound
                | DomainError::MatchNotFound => StatusCode::NOT_FOUND,
                DomainError::NotAuthorized | DomainError::NotInRoom => StatusCode::FORBIDDEN,
                _ => StatusCode::CONFLICT,
            },
        };
        ApiError::new(status, error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
