#[cfg(feature = "http-api")]
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Serialize, Serializer};

use crate::Error;

// Convenience error type.
#[derive(Debug)]
pub struct ApiError {
    status: Option<StatusCode>,
    kind: ApiErrorKind,
}

impl ApiError {
    pub fn new_from_anyhow(status: StatusCode, error: anyhow::Error) -> Self {
        Self {
            status: Some(status),
            kind: ApiErrorKind::OtherAnyhow(error),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self {
            status: Some(StatusCode::NOT_FOUND),
            kind: ApiErrorKind::UnknownMethod(method.to_owned()),
        }
    }

    pub fn read_only(method: &str) -> Self {
        Self {
            status: Some(StatusCode::FORBIDDEN),
            kind: ApiErrorKind::ReadOnly(method.to_owned()),
        }
    }

    pub const fn unathorized() -> Self {
        Self {
            status: Some(StatusCode::UNAUTHORIZED),
            kind: ApiErrorKind::Unauthorized,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_status(self, status: StatusCode) -> Self {
        Self {
            status: Some(status),
            kind: self.kind,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum ApiErrorKind {
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error("method {0:?} is not available in read-only mode")]
    ReadOnly(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    OtherAnyhow(#[from] anyhow::Error),
    #[error(transparent)]
    OtherError(#[from] Error),
}

fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::InvalidAddress(_)
        | Error::MixedAddressFamilies { .. }
        | Error::ReversedRange { .. }
        | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        Error::FilterSync(_) | Error::MissingMetric(_) => StatusCode::BAD_GATEWAY,
        Error::Persistence(_) | Error::CounterRegression { .. } | Error::Anyhow(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct SerializedError<'a> {
            error_kind: &'a str,
            human_readable: String,
            status: u16,
            status_text: String,
        }
        let serr = SerializedError {
            error_kind: match &self.kind {
                ApiErrorKind::UnknownMethod(_) => "unknown_method",
                ApiErrorKind::ReadOnly(_) => "read_only",
                ApiErrorKind::Unauthorized => "unathorized",
                ApiErrorKind::OtherAnyhow(_) => "internal_error",
                ApiErrorKind::OtherError(e) => match e {
                    Error::InvalidAddress(_)
                    | Error::MixedAddressFamilies { .. }
                    | Error::ReversedRange { .. } => "invalid_address",
                    Error::InvalidConfig(_) => "invalid_config",
                    Error::FilterSync(_) => "filter_sync",
                    Error::MissingMetric(_) => "engine_error",
                    Error::Persistence(_) => "persistence_error",
                    Error::CounterRegression { .. } => "counter_regression",
                    Error::Anyhow(_) => "internal_error",
                },
            },
            human_readable: format!("{self}"),
            status: self.status().as_u16(),
            status_text: self.status().to_string(),
        };
        serr.serialize(serializer)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        let status = value.downcast_ref::<ApiError>().and_then(|e| e.status);
        Self {
            status,
            kind: ApiErrorKind::OtherAnyhow(value),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self {
            status: Some(error_status(&e)),
            kind: ApiErrorKind::OtherError(e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ApiErrorKind::OtherAnyhow(err) => Some(err.as_ref()),
            ApiErrorKind::OtherError(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.kind)
    }
}

#[cfg(feature = "http-api")]
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = axum::Json(&self).into_response();
        *response.status_mut() = self.status();
        if self.status() == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                http::header::WWW_AUTHENTICATE,
                http::HeaderValue::from_static("Basic realm=\"API\""),
            );
        }
        response
    }
}

pub trait ApiErrorExt<T> {
    fn with_error_status_code(self, s: StatusCode) -> Result<T, ApiError>;
}

impl<T, E> ApiErrorExt<T> for std::result::Result<T, E>
where
    E: Into<ApiError>,
{
    fn with_error_status_code(self, s: StatusCode) -> Result<T, ApiError> {
        self.map_err(|e| e.into().with_status(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_by_error_kind() {
        let e = ApiError::from(Error::InvalidAddress("x".into()));
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["error_kind"], "invalid_address");
        assert_eq!(v["status"], 400);

        let e = ApiError::from(Error::FilterSync(anyhow::anyhow!("table full")));
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
        assert!(e.to_string().contains("table full"));

        let e = ApiError::from(Error::Persistence(anyhow::anyhow!("disk full")));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(serde_json::to_value(&e).unwrap()["error_kind"], "persistence_error");

        let e: Result<(), ApiError> =
            Err(anyhow::anyhow!("bad params")).with_error_status_code(StatusCode::BAD_REQUEST);
        assert_eq!(e.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
