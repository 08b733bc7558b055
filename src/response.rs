//! JSON:API response helpers.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::codec::{self, Document, Links};
use crate::datastore::Entity;
use crate::error::{ApiError, ApiErrors};
use crate::requests::Pagination;

/// Media type accepted and produced by the resource routes.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// `Content-Type` value set on every response the router produces.
pub const JSONAPI_CONTENT_TYPE: &str = "application/vnd.api+json; charset=UTF-8";

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: &'a [ApiError],
}

/// Serialize `body` as the response document. A body that cannot be encoded
/// leaves the request without a usable answer: it is logged as unrecoverable
/// and answered with a bare 500.
pub fn document<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(JSONAPI_CONTENT_TYPE))],
            bytes,
        )
            .into_response(),
        Err(err) => unrecoverable(err),
    }
}

fn unrecoverable(err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "unrecoverable: failed to encode response document");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

pub fn send_entity<E: Entity>(status: StatusCode, entity: &E) -> Response {
    match codec::encode(entity) {
        Ok(data) => document(status, &Document::new(data)),
        Err(err) => unrecoverable(err),
    }
}

/// 201 with the stored entity and a `Location` header pointing at it.
pub fn send_created<E: Entity>(entity: &E, location: &str) -> Response {
    let mut res = send_entity(StatusCode::CREATED, entity);
    if res.status() == StatusCode::CREATED {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                res.headers_mut().insert(header::LOCATION, value);
            }
            Err(err) => return unrecoverable(err),
        }
    }
    res
}

/// One page of a collection with `meta.total` and pagination links.
pub fn send_page<E: Entity>(path: &str, entities: &[E], page: &Pagination) -> Response {
    let data = match entities.iter().map(codec::encode).collect::<Result<Vec<_>, _>>() {
        Ok(data) => data,
        Err(err) => return unrecoverable(err),
    };
    let doc = Document::new(data)
        .with_meta(serde_json::json!({ "total": page.total }))
        .with_links(Links::for_page(path, page));
    document(StatusCode::OK, &doc)
}

pub fn send_no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn send_error(err: ApiError) -> Response {
    send_errors(ApiErrors::from(err))
}

pub fn send_errors(errors: ApiErrors) -> Response {
    let status = errors.status_code();
    for err in &errors.0 {
        if err.status_code().is_server_error() {
            tracing::error!(id = %err.id, status = %err.status, detail = ?err.detail, "request failed");
        } else {
            tracing::warn!(id = %err.id, status = %err.status, detail = ?err.detail, "request rejected");
        }
    }
    document(status, &ErrorBody { errors: &errors.0 })
}
