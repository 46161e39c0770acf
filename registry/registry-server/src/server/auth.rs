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
//! Registry API authentication middleware.

use std::{
    collections::HashSet,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{body::Body, response::IntoResponse};
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower::{BoxError, Layer, Service};
use tracing::debug;
use wgd_axum_connect_rpc::error::{CrpcError, CrpcErrorCode};
use wgd_registry_core::{model::User, service::RegistryService};
use wgd_token_validator::validator::{Token, TokenValidator, Validator};

use crate::crpc_api::crpc_error;

/// Claims of a registry bearer token. The subject is the email of the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryClaims {
    /// Email of the user the token was issued to.
    pub sub: String,
    /// Expiry in seconds since the Unix epoch.
    pub exp: u64,
}

impl Token for RegistryClaims {
    fn subject(&self) -> &str {
        &self.sub
    }

    fn exp_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.exp)
    }

    fn required_claims() -> Vec<&'static str> {
        vec!["sub", "exp"]
    }
}

/// The active user an authenticated request acts as.
#[derive(Debug, Clone)]
pub struct Actor(pub User);

#[derive(Clone)]
pub(crate) struct AuthMiddlewareLayer {
    validator: Validator<RegistryClaims>,
    service: RegistryService,
    public_paths: Arc<HashSet<String>>,
}

impl AuthMiddlewareLayer {
    pub(crate) fn new(
        validator: Validator<RegistryClaims>,
        service: RegistryService,
        public_paths: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            validator,
            service,
            public_paths: Arc::new(public_paths.into_iter().collect()),
        }
    }
}

impl<S> Layer<S> for AuthMiddlewareLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AuthMiddleware<S> {
    inner: S,
    layer: AuthMiddlewareLayer,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // Use the service that was polled ready and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.layer.public_paths.contains(request.uri().path()) {
            return Box::pin(async move { inner.call(request).await.map_err(Into::into) });
        }

        let token = match extract_bearer_token(&request) {
            Ok(token) => token,
            Err(err) => {
                debug!(error=%err, "Extract bearer token");
                return Box::pin(async move { Ok(unauthenticated(err)) });
            }
        };

        let claims = match self
            .layer
            .validator
            .validate(SystemTime::now(), token.as_str())
        {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error=%err, "Invalid token");
                return Box::pin(async move { Ok(unauthenticated(err)) });
            }
        };

        let service = self.layer.service.clone();
        Box::pin(async move {
            let user = match service.authenticate(claims.subject()).await {
                Ok(user) => user,
                Err(err) => {
                    debug!(subject=%claims.sub, error=%err, "Token subject rejected");
                    return Ok(crpc_error(err).into_response());
                }
            };
            request.extensions_mut().insert(Actor(user));
            request.extensions_mut().insert(claims);
            inner.call(request).await.map_err(Into::into)
        })
    }
}

fn unauthenticated<E: std::fmt::Display>(err: E) -> Response<Body> {
    CrpcError::new(CrpcErrorCode::Unauthenticated, err.to_string()).into_response()
}

/// Extracts the bearer token from the `Authorization` header of the request.
pub fn extract_bearer_token(req: &Request<Body>) -> Result<String, ExtractBearerTokenError> {
    let auth_header = match req.headers().get(http::header::AUTHORIZATION) {
        Some(header) => header,
        None => return Err(ExtractBearerTokenError::AuthHeaderMissing),
    };

    let auth_str = match auth_header.to_str() {
        Ok(str) => str,
        Err(_) => return Err(ExtractBearerTokenError::AuthHeaderInvalidUtf8),
    };

    match auth_str.strip_prefix("Bearer ") {
        Some(token) => Ok(token.trim().to_string()),
        None => Err(ExtractBearerTokenError::AuthHeaderNotBearer),
    }
}

/// Bearer token extraction error.
#[derive(Debug, Error)]
pub enum ExtractBearerTokenError {
    /// Authorization header is missing.
    #[error("authorization header is missing")]
    AuthHeaderMissing,
    /// Authorization header is not valid UTF-8.
    #[error("authorization header is not valid UTF-8")]
    AuthHeaderInvalidUtf8,
    /// Authorization header is not a Bearer token.
    #[error("authorization header is not a bearer token")]
    AuthHeaderNotBearer,
}

#[cfg(test)]
mod tests {
    use axum::{
        Extension, Router, body::to_bytes, error_handling::HandleErrorLayer, http::StatusCode,
        routing::post,
    };
    use tower::{ServiceBuilder, ServiceExt};
    use wgd_registry_core::{model::Role, store::memory::MemoryDocumentStore};
    use wgd_token_validator::validator::{insecure_public_key_pem, insecure_sign};

    use super::*;

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn token(email: &str) -> String {
        insecure_sign(&RegistryClaims {
            sub: email.into(),
            exp: now_secs() + 300,
        })
    }

    async fn whoami(Extension(Actor(user)): Extension<Actor>) -> String {
        user.email
    }

    async fn app() -> (Router, RegistryService) {
        let service = RegistryService::new(Arc::new(MemoryDocumentStore::new()));
        service
            .users()
            .ensure_admin("admin@example.com")
            .await
            .unwrap();
        let validator =
            Validator::from_public_key_pem(insecure_public_key_pem().as_bytes(), None).unwrap();
        let router = Router::new()
            .route("/whoami", post(whoami))
            .route("/public", post(|| async { "open" }))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(|err: BoxError| async move {
                        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                    }))
                    .layer(AuthMiddlewareLayer::new(
                        validator,
                        service.clone(),
                        ["/public".to_string()],
                    )),
            );
        (router, service)
    }

    async fn call(router: &Router, path: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::post(path);
        if let Some(token) = token {
            request = request.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test_log::test(tokio::test)]
    async fn resolves_active_user() {
        let (router, _) = app().await;
        let (status, body) = call(&router, "/whoami", Some(&token("Admin@Example.com"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin@example.com");
    }

    #[test_log::test(tokio::test)]
    async fn rejects_missing_or_invalid_tokens() {
        let (router, _) = app().await;

        let (status, body) = call(&router, "/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("unauthenticated"), "{body}");

        let (status, _) = call(&router, "/whoami", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let expired = insecure_sign(&RegistryClaims {
            sub: "admin@example.com".into(),
            exp: now_secs() - 10,
        });
        let (status, _) = call(&router, "/whoami", Some(&expired)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn rejects_users_that_are_not_active() {
        let (router, service) = app().await;
        let admin = service.authenticate("admin@example.com").await.unwrap();
        service
            .create_invited_user(&admin, "invitee@example.com".into(), Role::Member)
            .await
            .unwrap();

        let (status, body) = call(&router, "/whoami", Some(&token("invitee@example.com"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
        let (status, _) = call(&router, "/whoami", Some(&token("stranger@example.com"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn public_paths_skip_authentication() {
        let (router, _) = app().await;
        let (status, body) = call(&router, "/public", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "open");
    }
}
