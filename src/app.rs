//! Application assembly: middleware stack and resources behind one router.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::ServerConfig;
use crate::datastore::{Datastore, StoreError};
use crate::error::ConfigError;
use crate::resources::ShowResource;
use crate::router::{
    content_type, cors, firewall, logging, FirewallConfig, Guard, MiddlewareError, ResourceRouter, RouterError,
};

/// Anything that can stop the server from starting.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Guard accepting `Authorization: Bearer <token>`. Without a token every
/// request is authorized.
pub fn bearer_guard(token: Option<String>) -> Guard {
    match token {
        None => Arc::new(|_: &Request| true),
        Some(token) => {
            let expected = format!("Bearer {token}");
            Arc::new(move |req: &Request| {
                req.headers()
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v == expected)
            })
        }
    }
}

/// CORS policy for the resource routes. A `*` entry allows any origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LOCATION]);
    if origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::Invalid {
                key: "CORS_ALLOWED_ORIGINS",
                value: origin.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Register logging, CORS, the content-type gate, the firewall and the
/// `shows` resource, in that order.
pub fn build_router(datastore: Datastore, config: &ServerConfig) -> Result<ResourceRouter, SetupError> {
    let guard = bearer_guard(config.api_token.clone());
    let firewall_config = FirewallConfig::new(move |req: &Request| guard(req))
        .only(config.firewall_only.clone())
        .except(config.firewall_except.clone());

    let mut router = ResourceRouter::new();
    router
        .use_middleware(logging())
        .use_middleware(cors(cors_layer(&config.cors_allowed_origins)?))
        .use_middleware(content_type(config.accepted_content_types.clone()))
        .use_middleware(firewall(firewall_config)?);
    router.add_resource("shows", Arc::new(ShowResource::new(datastore)))?;
    Ok(router)
}

pub fn build_app(datastore: Datastore, config: &ServerConfig) -> Result<axum::Router, SetupError> {
    let router = build_router(datastore, config)?;
    Ok(router
        .into_axum()
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes)))
}
