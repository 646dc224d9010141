use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use root_payment_engine::{traits::RequestStoreError, PurchaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Rate limit exceeded. Try again in a minute.")]
    RateLimitExceeded,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<PurchaseError> for ServerError {
    fn from(e: PurchaseError) -> Self {
        match e {
            PurchaseError::InvalidRoot { .. } | PurchaseError::UnsupportedAsset(_) | PurchaseError::InvalidPrice(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            PurchaseError::RequestNotFound(_) => Self::NoRecordFound(e.to_string()),
            PurchaseError::Store(e) => e.into(),
        }
    }
}

impl From<RequestStoreError> for ServerError {
    fn from(e: RequestStoreError) -> Self {
        match e {
            e if e.is_conflict() => Self::Conflict(e.to_string()),
            RequestStoreError::RequestNotFound(_) => Self::NoRecordFound(e.to_string()),
            e => Self::BackendError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use root_payment_engine::db_types::{Asset, RequestId};

    use super::*;

    #[test]
    fn purchase_errors_map_to_status_codes() {
        let status = |e: PurchaseError| ServerError::from(e).status_code();
        assert_eq!(status(PurchaseError::InvalidRoot { root: 5, min: 100, max: 999 }), StatusCode::BAD_REQUEST);
        assert_eq!(status(PurchaseError::UnsupportedAsset(Asset::Card)), StatusCode::BAD_REQUEST);
        assert_eq!(status(PurchaseError::RequestNotFound(RequestId::random())), StatusCode::NOT_FOUND);
        assert_eq!(status(RequestStoreError::RootAlreadyClaimed(123).into()), StatusCode::CONFLICT);
        assert_eq!(status(RequestStoreError::DatabaseError("locked".into()).into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_body_is_json() {
        let res = ServerError::RateLimitExceeded.error_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("content-type").unwrap(), "application/json");
    }
}
