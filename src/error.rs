use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::session::FlowState;
use crate::table::TableError;

/// Failure of the single outbound call to the remote processing endpoint.
///
/// The display strings are shown to the operator verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Failed to process the file. Status code: {0}")]
    Status(u16),

    #[error("Error while processing the file: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Please log in first")]
    NotAuthenticated,

    #[error("Unsupported file type: {filename}. Allowed types: {allowed}")]
    UnsupportedExtension { filename: String, allowed: String },

    #[error("No file provided")]
    MissingFile,

    #[error("No file has been uploaded yet")]
    NothingStaged,

    #[error("No processed result is available")]
    NoResult,

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: FlowState,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Error while processing the file: {0}")]
    Table(#[from] TableError),

    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build the spreadsheet: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),
}

impl FlowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FlowError::InvalidCredentials | FlowError::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            FlowError::UnsupportedExtension { .. } | FlowError::MissingFile => {
                StatusCode::BAD_REQUEST
            }
            FlowError::NothingStaged | FlowError::NoResult | FlowError::InvalidState { .. } => {
                StatusCode::CONFLICT
            }
            FlowError::Remote(_) | FlowError::Table(_) => StatusCode::BAD_GATEWAY,
            FlowError::Io(_) | FlowError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            log::error!("Internal error: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
