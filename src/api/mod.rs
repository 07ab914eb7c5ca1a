//! REST API module.
//!
//! Read-only views of the cached playlist plus a manual refresh trigger. Every
//! envelope carries the cache revision the data was read at.

mod playlist;

pub use playlist::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Envelope `result`, tagging either side with `revision_id`.
pub fn respond<T: Serialize>(result: Result<T, AppError>, revision_id: i64) -> ApiResult<T> {
    match result {
        Ok(data) => Ok(ApiResponse {
            success: true,
            data,
            revision_id,
        }),
        Err(error) => Err(AppErrorWithRevision { error, revision_id }),
    }
}
