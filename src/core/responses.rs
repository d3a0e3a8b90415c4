use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use anyhow::Error;
use chrono::{DateTime, Utc};
use redis::RedisError;
use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, PartialEq)]
pub enum AppErrorType {
    NotFoundError,
    DbError,
    AuthError,
    JsonParseError,
    PayloadValidationError,
    CacheError,
    InternalServerError,
    ForbiddenError,
}

#[derive(Debug, PartialEq)]
pub struct AppError {
    pub error_type: AppErrorType,
    pub message: Option<String>,
    pub cause: Option<String>,
}

#[derive(Serialize)]
pub struct AppErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    pub fn message(&self) -> String {
        match &*self {
            AppError {
                message: Some(message),
                ..
            } => message.clone(),

            AppError {
                message: None,
                error_type: AppErrorType::NotFoundError,
                ..
            } => "The requested item was not found".to_string(),
            _ => "An unexpected error has occurred".to_string(),
        }
    }

    pub fn db_error(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::DbError,
            message: Some(error.to_string()),
        }
    }

    pub fn not_found(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::NotFoundError,
            message: Some(error.to_string()),
        }
    }

    pub fn bad_request(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::PayloadValidationError,
            message: Some(error.to_string()),
        }
    }

    pub fn unauthorized(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::AuthError,
            message: Some(error.to_string()),
        }
    }

    pub fn internal_error(error: impl ToString) -> AppError {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::InternalServerError,
            message: Some(error.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: Error) -> Self {
        AppError {
            message: None,
            cause: Some(error.to_string()),
            error_type: AppErrorType::DbError,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        AppError {
            cause: Some(error.to_string()),
            error_type: AppErrorType::DbError,
            message: Some(error.to_string()),
        }
    }
}

impl From<RedisError> for AppError {
    fn from(error: RedisError) -> Self {
        AppError {
            cause: Some(error.to_string()),
            message: Some("Internal Caching Error".to_string()),
            error_type: AppErrorType::CacheError,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self.error_type {
            AppErrorType::AuthError => StatusCode::UNAUTHORIZED,
            AppErrorType::DbError
            | AppErrorType::JsonParseError
            | AppErrorType::CacheError
            | AppErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            AppErrorType::NotFoundError => StatusCode::NOT_FOUND,
            AppErrorType::PayloadValidationError => StatusCode::BAD_REQUEST,
            AppErrorType::ForbiddenError => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(AppErrorResponse {
            success: false,
            message: self.message(),
        })
    }
}

#[derive(Serialize)]
pub struct AppSuccessResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<crate::models::pagination::PaginationMeta>,
}

/// Everything that can go wrong while verifying a payment and writing the
/// resulting subscriptions. Failures after the transaction commits never show
/// up here; they only surface in the response metadata.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidRequestBody(String),
    #[error("Payment signature verification failed")]
    InvalidSignature,
    #[error("Server payment configuration is incomplete")]
    MissingConfiguration(&'static str),
    #[error("This product is currently unavailable")]
    ProductUnavailable { item_index: usize },
    #[error("The selected plan duration is currently unavailable")]
    VariantUnavailable { item_index: usize, duration: String },
    #[error("No payment record was found for this order")]
    PaymentRecordMissing { order_id: String },
    #[error("No subscriptions were created for this order")]
    NoSubscriptionsCreated,
    #[error("A subscription for this payment already exists")]
    DuplicateSubscription,
    #[error("Something went wrong while creating your subscriptions")]
    Database(#[from] sqlx::Error),
    #[error("Something went wrong while creating your subscriptions")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutFailureResponse {
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_item_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl CheckoutError {
    pub fn failed_item_index(&self) -> Option<usize> {
        match self {
            CheckoutError::ProductUnavailable { item_index }
            | CheckoutError::VariantUnavailable { item_index, .. } => Some(*item_index),
            _ => None,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            CheckoutError::MissingConfiguration(what) => Some(what.to_string()),
            CheckoutError::VariantUnavailable { duration, .. } => {
                Some(format!("no active variant for duration `{}`", duration))
            }
            CheckoutError::PaymentRecordMissing { order_id } => {
                Some(format!("order `{}` has no payment record", order_id))
            }
            _ => None,
        }
    }
}

impl ResponseError for CheckoutError {
    fn status_code(&self) -> StatusCode {
        match self {
            CheckoutError::InvalidRequestBody(_)
            | CheckoutError::InvalidSignature
            | CheckoutError::ProductUnavailable { .. }
            | CheckoutError::VariantUnavailable { .. }
            | CheckoutError::PaymentRecordMissing { .. }
            | CheckoutError::NoSubscriptionsCreated
            | CheckoutError::DuplicateSubscription => StatusCode::BAD_REQUEST,
            CheckoutError::MissingConfiguration(_)
            | CheckoutError::Database(_)
            | CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(CheckoutFailureResponse {
            success: false,
            error: Some(self.to_string()),
            details: self.details(),
            failed_item_index: self.failed_item_index(),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_level_failures_carry_the_failing_index() {
        let err = CheckoutError::ProductUnavailable { item_index: 1 };
        assert_eq!(err.failed_item_index(), Some(1));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = CheckoutError::VariantUnavailable {
            item_index: 2,
            duration: "1 Month".into(),
        };
        assert_eq!(err.failed_item_index(), Some(2));
    }

    #[test]
    fn configuration_and_store_failures_are_server_errors() {
        let err = CheckoutError::MissingConfiguration("razorpay key secret");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.failed_item_index(), None);

        let err = CheckoutError::Internal("classifier failed".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn signature_and_validation_failures_are_bad_requests() {
        assert_eq!(
            CheckoutError::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CheckoutError::InvalidRequestBody("cart is empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CheckoutError::DuplicateSubscription.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
