use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use infra::capacity::CapacityError;
use infra::event_rules::EventRuleError;
use infra::rsvp::{TransitionError, UnknownStatus};

use crate::payments::ProviderError;

/// State conflicts: the caller should re-fetch and decide again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    CapacityExceeded,
    CapacityBelowReserved,
    PriceLocked,
    AlreadyConfirmed,
    AwaitingApproval,
    PaymentNotConfigured,
    NoPendingPayment,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ConflictKind::CapacityBelowReserved => "CAPACITY_BELOW_RESERVED",
            ConflictKind::PriceLocked => "PRICE_LOCKED",
            ConflictKind::AlreadyConfirmed => "ALREADY_CONFIRMED",
            ConflictKind::AwaitingApproval => "AWAITING_APPROVAL",
            ConflictKind::PaymentNotConfigured => "PAYMENT_NOT_CONFIGURED",
            ConflictKind::NoPendingPayment => "NO_PENDING_PAYMENT",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{message}")]
    Conflict { kind: ConflictKind, message: String },

    /// Detail is logged, never shown to the caller.
    #[error("payment provider request failed")]
    Provider(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("internal error")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        AppError::Conflict { kind, message: message.into() }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation { field, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation { .. } | AppError::InvalidSignature => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Db(_) | AppError::Internal(_) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) | AppError::Validation { .. } => "BAD_USER_INPUT",
            AppError::Conflict { kind, .. } => kind.code(),
            AppError::Provider(_) => "PAYMENT_PROVIDER_ERROR",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::Db(_) | AppError::Internal(_) | AppError::Anyhow(_) => "INTERNAL",
        }
    }

    /// Logs what the caller will not see.
    fn log_detail(&self) {
        match self {
            AppError::Db(e) => tracing::error!(error = %e, "database error"),
            AppError::Internal(detail) => tracing::error!(%detail, "internal error"),
            AppError::Anyhow(e) => tracing::error!(error = ?e, "internal error"),
            AppError::Provider(detail) => tracing::error!(%detail, "payment provider error"),
            _ => {}
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidTarget(_) => AppError::validation("status", e.to_string()),
            TransitionError::NotPendingApproval => {
                AppError::NotFound("registration pending approval".to_string())
            }
            TransitionError::NotAwaitingPayment => {
                AppError::conflict(ConflictKind::NoPendingPayment, e.to_string())
            }
        }
    }
}

impl From<CapacityError> for AppError {
    fn from(e: CapacityError) -> Self {
        let kind = match e {
            CapacityError::Full { .. } => ConflictKind::CapacityExceeded,
            CapacityError::BelowReserved { .. } => ConflictKind::CapacityBelowReserved,
        };
        AppError::conflict(kind, e.to_string())
    }
}

impl From<EventRuleError> for AppError {
    fn from(e: EventRuleError) -> Self {
        match e {
            EventRuleError::PriceLocked | EventRuleError::PaymentsPending => {
                AppError::conflict(ConflictKind::PriceLocked, e.to_string())
            }
            other => AppError::validation(other.field(), other.to_string()),
        }
    }
}

impl From<UnknownStatus> for AppError {
    fn from(e: UnknownStatus) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::Provider(e.to_string())
    }
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> async_graphql::Error {
        self.log_detail();
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", self.code());
            ext.set("status", self.status().as_u16());
            if let AppError::Validation { field, .. } = self {
                ext.set("field", *field);
            }
        })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log_detail();
        let field = match &self {
            AppError::Validation { field, .. } => Some(*field),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            field,
        };
        (self.status(), Json(body)).into_response()
    }
}
