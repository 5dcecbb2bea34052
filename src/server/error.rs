use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use serde::Serialize;

use crate::error::ChatError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error returned by every JSON endpoint. Messages are always safe to show.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    UnprocessableEntity(String),
    TooManyRequests(String),
    Internal(String),
    BadGateway(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::UnprocessableEntity(msg) => ("unprocessable_entity", msg),
            ApiError::TooManyRequests(msg) => ("rate_limited", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
            ApiError::BadGateway(msg) => ("backend_error", msg),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg),
        };
        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.user_message();
        match err {
            ChatError::AdmissionDenied(_) => ApiError::TooManyRequests(message),
            ChatError::ConversationNotFound(_) => ApiError::NotFound(message),
            ChatError::ContextUnavailable(_) => ApiError::ServiceUnavailable(message),
            ChatError::InvalidExportFormat(_) => ApiError::BadRequest(message),
            ChatError::InvalidMessage(_) => ApiError::UnprocessableEntity(message),
            ChatError::BackendRateLimited | ChatError::BackendUnavailable => {
                ApiError::ServiceUnavailable(message)
            }
            ChatError::BackendError | ChatError::EmptyOutput => ApiError::BadGateway(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::export::ExportFormat;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn renders_code_and_message_as_json() {
        let response = ApiError::NotFound("Conversation not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "Conversation not found");
    }

    #[test]
    fn chat_errors_map_to_statuses() {
        let cases = [
            (ChatError::AdmissionDenied("1.2.3.4".into()), StatusCode::TOO_MANY_REQUESTS),
            (ChatError::ConversationNotFound("x".into()), StatusCode::NOT_FOUND),
            (ChatError::ContextUnavailable("no doc".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ChatError::BackendError, StatusCode::BAD_GATEWAY),
            (ChatError::InvalidMessage("empty".into()), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }

        let parse_err = "pdf".parse::<ExportFormat>().unwrap_err();
        assert_eq!(ApiError::from(ChatError::from(parse_err)).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backend_detail_is_not_exposed() {
        let err = ApiError::from(ChatError::ContextUnavailable("/secret/path.txt missing".into()));
        match err {
            ApiError::ServiceUnavailable(msg) => assert!(!msg.contains("/secret")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
