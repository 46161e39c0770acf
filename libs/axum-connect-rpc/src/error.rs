// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Connect RPC error types and conversions.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

const APPLICATION_JSON: &str = "application/json";

/// A connect RPC error. See <https://connectrpc.com/docs/protocol/#error-end-stream>.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct CrpcError {
    /// The connect RPC error code.
    pub code: CrpcErrorCode,
    /// A human-readable message providing more details about the error.
    pub message: String,
    /// Json encoded detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Box<serde_json::value::Value>>,
}

impl CrpcError {
    /// Creates a new [`CrpcError`] from a [`CrpcErrorCode`] and a message.
    pub fn new(code: CrpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches a JSON detail to the error.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(Box::new(detail));
        self
    }

    /// Creates a new [`CrpcError`] from an HTTP status of a response that
    /// carried no connect error body.
    pub fn new_from_status(status: StatusCode) -> Self {
        let message = status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string();
        Self::new(status.into(), message)
    }

    /// Returns true if the caller may retry the call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            CrpcErrorCode::Unavailable | CrpcErrorCode::Aborted | CrpcErrorCode::DeadlineExceeded
        )
    }
}

impl std::error::Error for CrpcError {}

impl std::fmt::Display for CrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connect RPC error (code: {}): {}",
            self.code, self.message
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
/// Connect RPC error codes. See <https://connectrpc.com/docs/protocol/#error-code>.
#[serde(rename_all = "snake_case")]
pub enum CrpcErrorCode {
    /// RPC canceled, usually by the caller.
    Canceled,
    /// Catch-all for errors of unclear origin and errors without a more appropriate code.
    Unknown,
    /// Request is invalid, regardless of system state.
    InvalidArgument,
    /// Deadline expired before RPC could complete or before the client received the response.
    DeadlineExceeded,
    /// User requested a resource that can't be found.
    NotFound,
    /// Caller attempted to create a resource that already exists.
    AlreadyExists,
    /// Caller isn't authorized to perform the operation.
    PermissionDenied,
    /// Operation can't be completed because some resource is exhausted.
    ResourceExhausted,
    /// Operation can't be completed because the system isn't in the required state.
    FailedPrecondition,
    /// The operation was aborted, often because of concurrency issues.
    Aborted,
    /// The operation was attempted past the valid range.
    OutOfRange,
    /// The operation isn't implemented, supported, or enabled.
    Unimplemented,
    /// An invariant expected by the underlying system has been broken.
    Internal,
    /// The service is currently unavailable, usually transiently. Clients should back off and
    /// retry idempotent operations.
    Unavailable,
    /// Unrecoverable data loss or corruption.
    DataLoss,
    /// Caller doesn't have valid authentication credentials for the operation.
    Unauthenticated,
}

impl CrpcErrorCode {
    /// The wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid_argument",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceExhausted => "resource_exhausted",
            Self::FailedPrecondition => "failed_precondition",
            Self::Aborted => "aborted",
            Self::OutOfRange => "out_of_range",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::DataLoss => "data_loss",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for CrpcErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<E: std::fmt::Display> From<(StatusCode, E)> for CrpcError {
    fn from((status, err): (StatusCode, E)) -> Self {
        CrpcError::new(status.into(), err.to_string())
    }
}

/// See <https://connectrpc.com/docs/protocol/#http-to-error-code>.
impl From<StatusCode> for CrpcErrorCode {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::Internal,
            StatusCode::UNAUTHORIZED => Self::Unauthenticated,
            StatusCode::FORBIDDEN => Self::PermissionDenied,
            StatusCode::NOT_FOUND => Self::Unimplemented,
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Self::Unavailable,
            _ => Self::Unknown,
        }
    }
}

/// See <https://connectrpc.com/docs/protocol/#error-codes>.
impl From<CrpcErrorCode> for StatusCode {
    fn from(code: CrpcErrorCode) -> Self {
        match code {
            CrpcErrorCode::Canceled => StatusCode::REQUEST_TIMEOUT,
            CrpcErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            CrpcErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            CrpcErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            CrpcErrorCode::NotFound => StatusCode::NOT_FOUND,
            CrpcErrorCode::AlreadyExists => StatusCode::CONFLICT,
            CrpcErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            CrpcErrorCode::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            CrpcErrorCode::FailedPrecondition => StatusCode::BAD_REQUEST,
            CrpcErrorCode::Aborted => StatusCode::CONFLICT,
            CrpcErrorCode::OutOfRange => StatusCode::BAD_REQUEST,
            CrpcErrorCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            CrpcErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            CrpcErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            CrpcErrorCode::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            CrpcErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for CrpcError {
    fn into_response(self) -> axum::response::Response {
        let status: StatusCode = self.code.into();
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"code":"internal","message":"failed to serialize error"}"#.to_string()
        });

        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_deserialize() {
        let err = CrpcError::new(CrpcErrorCode::ResourceExhausted, "subnet is full")
            .with_detail(serde_json::json!({"subnet": "10.0.0.0/30"}));
        let serialized = serde_json::to_string(&err).expect("failed to serialize");

        assert_eq!(
            r#"{"code":"resource_exhausted","message":"subnet is full","detail":{"subnet":"10.0.0.0/30"}}"#,
            serialized
        );

        let deserialized: CrpcError =
            serde_json::from_str(&serialized).expect("failed to deserialize");
        assert_eq!(err, deserialized);
    }

    #[test]
    fn detail_is_optional_on_the_wire() {
        let err: CrpcError =
            serde_json::from_str(r#"{"code":"not_found","message":"no such subnet"}"#).unwrap();
        assert_eq!(err, CrpcError::new(CrpcErrorCode::NotFound, "no such subnet"));
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"code":"not_found","message":"no such subnet"}"#
        );
    }

    #[test]
    fn codes_map_to_documented_http_status() {
        let cases = [
            (CrpcErrorCode::NotFound, StatusCode::NOT_FOUND),
            (CrpcErrorCode::AlreadyExists, StatusCode::CONFLICT),
            (CrpcErrorCode::FailedPrecondition, StatusCode::BAD_REQUEST),
            (CrpcErrorCode::PermissionDenied, StatusCode::FORBIDDEN),
            (CrpcErrorCode::ResourceExhausted, StatusCode::TOO_MANY_REQUESTS),
            (CrpcErrorCode::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
            (CrpcErrorCode::Unauthenticated, StatusCode::UNAUTHORIZED),
        ];
        for (code, status) in cases {
            assert_eq!(StatusCode::from(code), status, "{code}");
        }
    }

    #[test]
    fn only_transient_codes_are_retryable() {
        assert!(CrpcError::new(CrpcErrorCode::Unavailable, "store down").is_retryable());
        assert!(!CrpcError::new(CrpcErrorCode::AlreadyExists, "dup").is_retryable());
    }

    #[test]
    fn response_carries_json_body() {
        let response = CrpcError::new(CrpcErrorCode::PermissionDenied, "admins only").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            APPLICATION_JSON
        );
    }
}
