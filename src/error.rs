use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::common::{ApiResponse, Toast};

#[derive(Debug, Error)]
pub enum AppError {
    /// Identity-provider failures, rendered inline on the auth forms.
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    /// A table mutation failed; the operation is abandoned.
    #[error("Could not save changes: {0}")]
    Data(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn toast(&self) -> Option<Toast> {
        match self {
            // shown inline on the form instead
            AppError::Auth(_) | AppError::Validation(_) => None,
            AppError::Payment(message) => Some(Toast::destructive("Payment failed", message.clone())),
            AppError::Conflict(message) => Some(Toast::destructive("Unavailable", message.clone())),
            AppError::NotFound(what) => Some(Toast::destructive("Not found", format!("{} not found", what))),
            AppError::Data(message) => Some(Toast::destructive("Something went wrong", message.clone())),
            AppError::Internal(_) => Some(Toast::destructive(
                "Something went wrong",
                "Please try again in a moment.",
            )),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value for {}", field),
                })
            })
            .collect();
        AppError::Validation(messages.join("; "))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
            AppError::Data(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Internal(e) = self {
            log::error!("Internal error: {:#}", e);
        }
        HttpResponse::build(self.status_code())
            .json(ApiResponse::<()>::error(self.to_string(), self.toast()))
    }
}
