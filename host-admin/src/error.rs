use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures an admin operation reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotImplemented(String),
    /// Infrastructure failure; surfaces untranslated as a 500.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl AdminError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminError::Conflict(_) => StatusCode::CONFLICT,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AdminError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AdminError::Fatal(e) = &self {
            error!("unhandled admin failure: {e:#}");
        }
        (status, format!("{self:#}")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AdminError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AdminError::NotImplemented("x".into()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        let fatal: AdminError = anyhow::anyhow!("disk full").into();
        assert_eq!(fatal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(format!("{fatal:#}"), "disk full");
    }
}
