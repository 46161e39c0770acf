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
//! Connect RPC axum extractors for unary calls.

use std::fmt::Debug;

use axum::{
    extract::{FromRequest, Request, rejection::BytesRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::error::{CrpcError, CrpcErrorCode};

/// Content type of unary calls with protobuf payloads.
pub const APPLICATION_PROTO: &str = "application/proto";

/// Wrapper connect RPC type for a prost message.
pub struct ConnectRpc<T: prost::Message + Default + Sized + 'static>(pub T);

impl<T: prost::Message + Default + Sized + 'static> ConnectRpc<T> {
    /// Extract the inner message.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: prost::Message + Default + Sized + 'static + Debug> std::fmt::Debug for ConnectRpc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectRpc").field(&self.0).finish()
    }
}

impl<T: prost::Message + Default + Sized + 'static> std::ops::Deref for ConnectRpc<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequest<S> for ConnectRpc<T>
where
    S: Send + Sync,
    T: prost::Message + Default + Sized + 'static,
{
    type Rejection = ConnectRpcRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        check_content_type(req.headers(), APPLICATION_PROTO)?;

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(ConnectRpcRejection::BytesRejection)?;

        let message = T::decode(bytes).map_err(|_e| ConnectRpcRejection::DecodingFailed)?;

        Ok(ConnectRpc(message))
    }
}

impl<T> IntoResponse for ConnectRpc<T>
where
    T: prost::Message + Default + Sized + 'static,
{
    fn into_response(self) -> Response {
        let ConnectRpc(message) = self;
        let buf = message.encode_to_vec();

        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_PROTO))],
            buf,
        )
            .into_response()
    }
}

impl<T: prost::Message + Default + Sized + 'static> From<T> for ConnectRpc<T> {
    fn from(value: T) -> Self {
        ConnectRpc(value)
    }
}

/// Checks the media type of the request, ignoring parameters.
pub(crate) fn check_content_type(
    headers: &HeaderMap,
    expected: &'static str,
) -> Result<(), ConnectRpcRejection> {
    let Some(content_type) = headers.get(header::CONTENT_TYPE) else {
        return Err(ConnectRpcRejection::InvalidContentType(
            "Missing content type".into(),
        ));
    };

    let Ok(content_type) = content_type.to_str() else {
        return Err(ConnectRpcRejection::InvalidContentType(
            "Failed to parse content type".into(),
        ));
    };

    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(expected) {
        return Err(ConnectRpcRejection::InvalidContentType(format!(
            "Expected: {expected}, got: {content_type}"
        )));
    }

    Ok(())
}

/// Possible rejections when extracting a Connect RPC request.
#[derive(Debug)]
pub enum ConnectRpcRejection {
    /// Failed to extract bytes.
    BytesRejection(BytesRejection),
    /// Invalid content type.
    InvalidContentType(String),
    /// Failed to decode the message.
    DecodingFailed,
}

impl From<ConnectRpcRejection> for CrpcError {
    fn from(rejection: ConnectRpcRejection) -> Self {
        match rejection {
            ConnectRpcRejection::BytesRejection(rejection) => {
                CrpcError::new(CrpcErrorCode::InvalidArgument, rejection.body_text())
            }
            ConnectRpcRejection::InvalidContentType(reason) => CrpcError::new(
                CrpcErrorCode::InvalidArgument,
                format!("Invalid content type: {reason}"),
            ),
            ConnectRpcRejection::DecodingFailed => {
                CrpcError::new(CrpcErrorCode::InvalidArgument, "Failed to decode message")
            }
        }
    }
}

impl IntoResponse for ConnectRpcRejection {
    fn into_response(self) -> Response {
        match self {
            ConnectRpcRejection::InvalidContentType(_) => {
                // Unsupported codecs are answered before any connect framing.
                let mut response = CrpcError::from(self).into_response();
                *response.status_mut() = StatusCode::UNSUPPORTED_MEDIA_TYPE;
                response
            }
            other => CrpcError::from(other).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, routing::post};
    use prost::Message;
    use tower::ServiceExt;

    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        text: String,
    }

    fn router() -> Router {
        Router::new().route(
            "/ping",
            post(|ConnectRpc(ping): ConnectRpc<Ping>| async move {
                ConnectRpc(Ping {
                    text: format!("pong {}", ping.text),
                })
            }),
        )
    }

    #[tokio::test]
    async fn decodes_and_encodes_protobuf() {
        let body = Ping {
            text: "hello".into(),
        }
        .encode_to_vec();
        let response = router()
            .oneshot(
                Request::post("/ping")
                    .header(header::CONTENT_TYPE, APPLICATION_PROTO)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(Ping::decode(bytes).unwrap().text, "pong hello");
    }

    #[tokio::test]
    async fn rejects_json_payloads() {
        let response = router()
            .oneshot(
                Request::post("/ping")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_argument() {
        let response = router()
            .oneshot(
                Request::post("/ping")
                    .header(header::CONTENT_TYPE, "application/proto; charset=utf-8")
                    .body(Body::from(vec![0xff, 0xff, 0xff]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let err: CrpcError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err.code, CrpcErrorCode::InvalidArgument);
    }
}
