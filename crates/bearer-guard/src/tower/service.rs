//! Tower Service for the resource-server guard
//!
//! [`GuardService`] implements `Service<http::Request<B>>`:
//! - extracts the token from the `Authorization: Bearer` header
//! - runs it through the [`ResourceServerGuard`]
//! - on success inserts the [`AuthContext`](crate::AuthContext) into the
//!   request extensions and calls the inner service
//! - on rejection answers with a 401/403 response built from the
//!   [`Rejection`](crate::Rejection)
//!
//! Rejections are responses, not service errors, so `Error` stays the inner
//! service's error type.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower_service::Service;

use crate::guard::ResourceServerGuard;

use super::extract_bearer;

/// Tower Service that gates requests on a bearer token
#[derive(Debug, Clone)]
pub struct GuardService<S> {
    inner: S,
    guard: Arc<ResourceServerGuard>,
}

impl<S> GuardService<S> {
    /// Create a new guard service
    pub fn new(inner: S, guard: Arc<ResourceServerGuard>) -> Self {
        Self { inner, guard }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Future returned by [`GuardService`]
pub type GuardServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for GuardService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = GuardServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // The ready clone stays behind for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let guard = Arc::clone(&self.guard);

        Box::pin(async move {
            let token = extract_bearer(req.headers()).map(str::to_owned);
            match guard.authenticate(token.as_deref()).await {
                Ok(auth) => {
                    req.extensions_mut().insert(auth);
                    inner.call(req).await
                }
                Err(rejection) => Ok(rejection.into_response()),
            }
        })
    }
}
