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
//! Server streaming calls.

use std::{convert::Infallible, pin::Pin};

use axum::{
    body::Body,
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};

use crate::{
    envelope::{APPLICATION_CONNECT_PROTO, DEFAULT_MAX_PAYLOAD_LEN, Envelope, decode_single},
    error::CrpcError,
    extractor::{ConnectRpcRejection, check_content_type},
};

/// The single enveloped request message of a server streaming call.
pub struct ConnectStreamRequest<T: prost::Message + Default + 'static>(pub T);

impl<S, T> FromRequest<S> for ConnectStreamRequest<T>
where
    S: Send + Sync,
    T: prost::Message + Default + 'static,
{
    type Rejection = ConnectRpcRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        check_content_type(req.headers(), APPLICATION_CONNECT_PROTO)?;

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(ConnectRpcRejection::BytesRejection)?;
        let envelope = decode_single(&bytes, DEFAULT_MAX_PAYLOAD_LEN)
            .map_err(|_e| ConnectRpcRejection::DecodingFailed)?;
        if envelope.is_end_stream() {
            return Err(ConnectRpcRejection::DecodingFailed);
        }
        let message = T::decode(envelope.payload).map_err(|_e| ConnectRpcRejection::DecodingFailed)?;

        Ok(ConnectStreamRequest(message))
    }
}

type BoxMessageStream<M> = Pin<Box<dyn Stream<Item = Result<M, CrpcError>> + Send>>;

/// A server streaming response.
///
/// Items are encoded as they are polled by the HTTP body, so the producer
/// runs at the pace of the client. The first error item terminates the
/// stream with an end-of-stream envelope carrying that error; otherwise an
/// empty end-of-stream envelope follows the last item.
pub struct ConnectStream<M: prost::Message + 'static> {
    inner: BoxMessageStream<M>,
}

impl<M: prost::Message + 'static> ConnectStream<M> {
    /// Wraps a stream of messages.
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<M, CrpcError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
        }
    }

    /// A stream that fails immediately.
    pub fn error(err: CrpcError) -> Self {
        Self::new(stream::once(async move { Err(err) }))
    }
}

enum Progress<M: prost::Message + 'static> {
    Streaming(BoxMessageStream<M>),
    Done,
}

impl<M: prost::Message + 'static> IntoResponse for ConnectStream<M> {
    fn into_response(self) -> Response {
        let frames = stream::unfold(Progress::Streaming(self.inner), |progress| async move {
            let Progress::Streaming(mut inner) = progress else {
                return None;
            };
            let frame = match inner.next().await {
                Some(Ok(message)) => {
                    let frame = Envelope::message(message.encode_to_vec()).encode();
                    return Some((frame, Progress::Streaming(inner)));
                }
                Some(Err(err)) => Envelope::end_stream(Some(err)).encode(),
                None => Envelope::end_stream(None).encode(),
            };
            Some((frame, Progress::Done))
        });

        (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(APPLICATION_CONNECT_PROTO),
            )],
            Body::from_stream(frames.map(Ok::<_, Infallible>)),
        )
            .into_response()
    }
}
