use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::server::utils::cors_utils::cors_headers;

pub type AppResult<T> = Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// the inbound path didn't carry a usable http(s) target
    #[error("{0}")]
    BadRequest(String),

    /// upstream answered with a non-success status
    #[error("HTTP error {status}: {url}. Body: {body}")]
    Upstream {
        status: u16,
        url: String,
        body: String,
    },

    /// upstream couldn't be reached or the body couldn't be read
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("too many nested master playlists (limit {limit}): {url}")]
    RecursionLimit { limit: u32, url: String },

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::BadRequest(message) => {
                debug!("rejecting proxy request: {}", message);
                message.clone()
            }
            other => {
                error!("proxy request failed: {}", other);
                format!("Proxy error: {}", other)
            }
        };

        (status, cors_headers(), body).into_response()
    }
}
