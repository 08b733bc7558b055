//! Resource-oriented router: route registration, capability-based resource
//! wiring, and middleware composition on top of `axum`.
//!
//! Routes and middlewares are registered once at startup; the composed
//! handler is read-only afterwards and shared by all in-flight requests.

mod middleware;
mod pattern;
mod resource;
mod vars;

pub use middleware::{
    content_type, cors, firewall, logging, FirewallConfig, Guard, Handler, Middleware, MiddlewareError,
};
pub use pattern::PathPattern;
pub use resource::{Destroyable, Listable, Resource, Storable, Updatable, Viewable};
pub use vars::{vars, Vars};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{RawPathParams, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
};
use thiserror::Error;
use tower::ServiceExt;

use crate::response::JSONAPI_CONTENT_TYPE;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("route already registered: {method} {path}")]
    DuplicateRoute { method: Method, path: String },
    #[error("route '{path}' names its variables differently from '{existing}'")]
    ConflictingRoute { path: String, existing: String },
    #[error("unsupported route method: {0}")]
    UnsupportedMethod(Method),
}

/// A URL path with some context added.
pub struct Route {
    pub path: String,
    pub method: Method,
    pub handler: Handler,
    pub name: String,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, name: impl Into<String>, handler: Handler) -> Self {
        Route {
            path: path.into(),
            method,
            handler,
            name: name.into(),
        }
    }
}

/// A registered route as reported by [`ResourceRouter::routes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub name: String,
    pub method: Method,
    pub path: String,
}

pub struct ResourceRouter {
    table: axum::Router,
    routes: Vec<RouteInfo>,
    keys: HashSet<(Method, String)>,
    shapes: HashMap<String, String>,
    middlewares: Vec<Middleware>,
}

impl Default for ResourceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRouter {
    pub fn new() -> Self {
        ResourceRouter {
            table: axum::Router::new(),
            routes: Vec::new(),
            keys: HashSet::new(),
            shapes: HashMap::new(),
            middlewares: Vec::new(),
        }
    }

    /// Register one route. Malformed patterns and an already registered
    /// (method, path) pair are rejected here rather than at request time.
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self, RouterError> {
        let pattern = Arc::new(PathPattern::parse(&route.path)?);
        let filter = MethodFilter::try_from(route.method.clone())
            .map_err(|_| RouterError::UnsupportedMethod(route.method.clone()))?;
        let path = pattern.transport_path();
        let shape = pattern.shape();
        if let Some(existing) = self.shapes.get(&shape) {
            if *existing != path {
                return Err(RouterError::ConflictingRoute {
                    path: route.path,
                    existing: existing.clone(),
                });
            }
        }
        if !self.keys.insert((route.method.clone(), shape.clone())) {
            return Err(RouterError::DuplicateRoute {
                method: route.method,
                path: route.path,
            });
        }
        self.shapes.insert(shape, path.clone());
        tracing::info!(name = %route.name, method = %route.method, path = %route.path, "registering route");

        let handler = route.handler;
        let method_router = on(filter, move |req: Request| async move { handler.call(req).await })
            .route_layer(from_fn_with_state(pattern, capture_vars));
        let table = std::mem::replace(&mut self.table, axum::Router::new());
        self.table = table.route(&path, method_router);
        self.routes.push(RouteInfo {
            name: route.name,
            method: route.method,
            path: route.path,
        });
        Ok(self)
    }

    pub fn add_routes(&mut self, routes: impl IntoIterator<Item = Route>) -> Result<&mut Self, RouterError> {
        for route in routes {
            self.add_route(route)?;
        }
        Ok(self)
    }

    /// Register the routes of every capability `resource` has, in the order
    /// list, store, view, update, destroy:
    ///
    /// | capability | route |
    /// |---|---|
    /// | list | `GET /{prefix}` |
    /// | store | `POST /{prefix}` |
    /// | view | `GET /{prefix}/{id}` |
    /// | update | `PATCH /{prefix}/{id}` |
    /// | destroy | `DELETE /{prefix}/{id}` |
    pub fn add_resource<R: Resource>(&mut self, prefix: &str, resource: Arc<R>) -> Result<&mut Self, RouterError> {
        let prefix = prefix.trim_matches('/');
        let collection = format!("/{prefix}");
        let member = format!("/{prefix}/{{id:[0-9]+}}");

        if let Some(r) = resource.clone().listable() {
            self.add_route(Route::new(
                Method::GET,
                &collection,
                format!("{prefix}.list"),
                Handler::new(move |req| {
                    let r = r.clone();
                    async move { r.route_list(req).await }
                }),
            ))?;
        }
        if let Some(r) = resource.clone().storable() {
            self.add_route(Route::new(
                Method::POST,
                &collection,
                format!("{prefix}.store"),
                Handler::new(move |req| {
                    let r = r.clone();
                    async move { r.route_store(req).await }
                }),
            ))?;
        }
        if let Some(r) = resource.clone().viewable() {
            self.add_route(Route::new(
                Method::GET,
                &member,
                format!("{prefix}.view"),
                Handler::new(move |req| {
                    let r = r.clone();
                    async move { r.route_view(req).await }
                }),
            ))?;
        }
        if let Some(r) = resource.clone().updatable() {
            self.add_route(Route::new(
                Method::PATCH,
                &member,
                format!("{prefix}.update"),
                Handler::new(move |req| {
                    let r = r.clone();
                    async move { r.route_update(req).await }
                }),
            ))?;
        }
        if let Some(r) = resource.destroyable() {
            self.add_route(Route::new(
                Method::DELETE,
                &member,
                format!("{prefix}.delete"),
                Handler::new(move |req| {
                    let r = r.clone();
                    async move { r.route_destroy(req).await }
                }),
            ))?;
        }
        Ok(self)
    }

    /// Append a middleware; the first registered is the outermost.
    pub fn use_middleware(&mut self, mw: Middleware) -> &mut Self {
        self.middlewares.push(mw);
        self
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// The route table wrapped by every middleware. Unmatched requests get
    /// the transport's plain 404/405. Every response carries the JSON:API
    /// content type.
    pub fn handler(&self) -> Handler {
        let table = self.table.clone();
        let mut handler = Handler::new(move |req: Request| {
            let table = table.clone();
            async move {
                match table.oneshot(req).await {
                    Ok(res) => res,
                    Err(never) => match never {},
                }
            }
        });
        for mw in self.middlewares.iter().rev() {
            handler = mw.wrap(handler);
        }
        Handler::new(move |req| {
            let handler = handler.clone();
            async move {
                let mut res = handler.call(req).await;
                res.headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSONAPI_CONTENT_TYPE));
                res
            }
        })
    }

    pub async fn dispatch(&self, req: Request) -> Response {
        self.handler().call(req).await
    }

    /// Precompose once and expose the result as an `axum::Router` for `axum::serve`.
    pub fn into_axum(self) -> axum::Router {
        let handler = self.handler();
        axum::Router::new().fallback(move |req: Request| async move { handler.call(req).await })
    }
}

/// Enforce the route's segment matchers and expose the captures as [`Vars`].
/// A capture the matcher rejects means the route did not match.
async fn capture_vars(
    State(pattern): State<Arc<PathPattern>>,
    params: RawPathParams,
    mut req: Request,
    next: Next,
) -> Response {
    if !pattern.accepts(params.iter()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let captured: Vars = params
        .iter()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect();
    req.extensions_mut().insert(captured);
    next.run(req).await
}
