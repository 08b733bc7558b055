//! Resource capabilities. A resource opts into each verb by implementing the
//! matching trait and exposing it through [`Resource`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::Request, response::Response};

/// `GET /{prefix}`
#[async_trait]
pub trait Listable: Send + Sync {
    async fn route_list(&self, req: Request) -> Response;
}

/// `POST /{prefix}`
#[async_trait]
pub trait Storable: Send + Sync {
    async fn route_store(&self, req: Request) -> Response;
}

/// `GET /{prefix}/{id}`
#[async_trait]
pub trait Viewable: Send + Sync {
    async fn route_view(&self, req: Request) -> Response;
}

/// `PATCH /{prefix}/{id}`
#[async_trait]
pub trait Updatable: Send + Sync {
    async fn route_update(&self, req: Request) -> Response;
}

/// `DELETE /{prefix}/{id}`
#[async_trait]
pub trait Destroyable: Send + Sync {
    async fn route_destroy(&self, req: Request) -> Response;
}

/// Capability probe used by `ResourceRouter::add_resource`. Each method
/// returns the capability when the resource has it; the defaults report none.
pub trait Resource: Send + Sync + 'static {
    fn listable(self: Arc<Self>) -> Option<Arc<dyn Listable>> {
        None
    }

    fn storable(self: Arc<Self>) -> Option<Arc<dyn Storable>> {
        None
    }

    fn viewable(self: Arc<Self>) -> Option<Arc<dyn Viewable>> {
        None
    }

    fn updatable(self: Arc<Self>) -> Option<Arc<dyn Updatable>> {
        None
    }

    fn destroyable(self: Arc<Self>) -> Option<Arc<dyn Destroyable>> {
        None
    }
}
