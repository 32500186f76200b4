//! HTTP error mapping

use serde_json::json;
use std::convert::Infallible;
use stride_core::PipelineError;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

/// Error returned to HTTP clients as `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown analysis or route
    #[error("{0}")]
    NotFound(String),

    /// Malformed request
    #[error("{0}")]
    BadRequest(String),

    /// Server-side failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON reply with status
    #[must_use]
    pub fn to_reply(&self) -> warp::reply::WithStatus<warp::reply::Json> {
        warp::reply::with_status(warp::reply::json(&json!({"error": self.to_string()})), self.status())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else if err.is_validation() {
            Self::BadRequest(err.to_string())
        } else {
            tracing::error!(error = %err, "request failed");
            Self::Internal(err.to_string())
        }
    }
}

impl warp::reject::Reject for ApiError {}

/// Turn a pipeline error into a rejection
pub(crate) fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

/// Map every rejection to a JSON error reply
///
/// # Errors
/// Never fails.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let api_error = if let Some(api_error) = err.find::<ApiError>() {
        return Ok(api_error.to_reply());
    } else if err.is_not_found() {
        ApiError::NotFound("route not found".into())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::BadRequest(format!("invalid request body: {e}"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({"error": "upload too large"})),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({"error": "method not allowed"})),
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    } else if let Some(e) = err.find::<warp::cors::CorsForbidden>() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({"error": e.to_string()})),
            StatusCode::FORBIDDEN,
        ));
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        ApiError::BadRequest(e.to_string())
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        ApiError::Internal("internal server error".into())
    };
    Ok(api_error.to_reply())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_model::{AnalysisId, ComponentId};

    #[test]
    fn status_mapping() {
        let not_found = ApiError::from(PipelineError::AnalysisNotFound(AnalysisId::new()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad = ApiError::from(PipelineError::UnknownComponent {
            analysis: AnalysisId::new(),
            component: ComponentId::new("c9").unwrap(),
        });
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let validation = ApiError::from(PipelineError::Validation("empty".into()));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let internal = ApiError::from(PipelineError::Gateway(stride_llm::GatewayError::EmptyResponse));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
