//! Tower Layer for the resource-server guard

use std::sync::Arc;
use tower::Layer;

use crate::guard::ResourceServerGuard;

use super::service::GuardService;

/// Tower Layer that wraps services with [`GuardService`]
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use bearer_guard::tower::GuardLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(GuardLayer::new(guard))
///     .service(my_inner_service);
/// ```
#[derive(Debug, Clone)]
pub struct GuardLayer {
    guard: Arc<ResourceServerGuard>,
}

impl GuardLayer {
    /// Create a layer sharing `guard`
    pub fn new(guard: Arc<ResourceServerGuard>) -> Self {
        Self { guard }
    }

    /// The shared guard
    pub fn guard(&self) -> &Arc<ResourceServerGuard> {
        &self.guard
    }
}

impl From<ResourceServerGuard> for GuardLayer {
    fn from(guard: ResourceServerGuard) -> Self {
        Self::new(Arc::new(guard))
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService::new(inner, Arc::clone(&self.guard))
    }
}
