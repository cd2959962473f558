use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vb_store::models::VpsStatus;

use crate::notify::NotifyError;

/// Transport-level failures on the interactions endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request signature")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Failures of a chat command. Every variant ends as an ephemeral reply.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("vps {0} not found")]
    NotFound(String),

    #[error("not owner or not found")]
    NotOwnerOrNotFound,

    #[error("vps {id} is {status}, expected available")]
    NotAvailable { id: String, status: VpsStatus },

    #[error("vps {0} is not running")]
    NotRunning(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("container runtime error: {0}")]
    ExternalTool(#[from] vb_infra::Error),

    #[error("no connection string in logs of container {container_id}")]
    Extraction { container_id: String },

    #[error("delivery failed: {0}")]
    Delivery(#[from] NotifyError),

    #[error("store error: {0}")]
    Store(#[from] vb_store::Error),
}

impl CommandError {
    /// Failures caused by our dependencies rather than by the caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ExternalTool(_) | Self::Extraction { .. } | Self::Store(_)
        )
    }

    /// Reply text for the invoking user. Runtime diagnostics and store
    /// errors are only spelled out for `privileged` callers.
    pub fn user_message(&self, privileged: bool) -> String {
        match self {
            Self::Unauthorized => "You are not authorized to use this command.".into(),
            Self::NotFound(id) => format!("VPS with ID `{id}` does not exist."),
            Self::NotOwnerOrNotFound => "You do not own this VPS or it does not exist.".into(),
            Self::NotAvailable { id, status } => {
                format!("VPS `{id}` is {status} and cannot be deployed.")
            }
            Self::NotRunning(id) => format!("VPS `{id}` is not running."),
            Self::InvalidInput(msg) => msg.clone(),
            Self::ExternalTool(e) if privileged => {
                let detail = e.diagnostic().map(str::to_string).unwrap_or_else(|| e.to_string());
                format!("An error occurred with the container runtime:\n```{detail}```")
            }
            Self::ExternalTool(_) => {
                "The container runtime reported an error. Please contact an administrator.".into()
            }
            Self::Extraction { .. } => "Failed to get tmate connection string.".into(),
            Self::Delivery(NotifyError::Refused) => {
                "Could not DM the user. They may have DMs disabled.".into()
            }
            Self::Delivery(NotifyError::Discord(_)) => {
                "Could not reach Discord to message the user. Please try again later.".into()
            }
            Self::Store(e) if privileged => format!("A database error occurred:\n```{e}```"),
            Self::Store(_) => "An internal error occurred. Please try again later.".into(),
        }
    }
}
