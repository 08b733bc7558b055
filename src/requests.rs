//! Request parsing shared by resource handlers: path ids, pagination, bodies.

use std::collections::HashMap;
use std::error::Error;

use axum::{body::Bytes, extract::Query, extract::Request, http::Uri};
use http_body_util::LengthLimitError;

use crate::codec;
use crate::datastore::{Datastore, Entity};
use crate::error::ApiError;
use crate::router::Vars;
use crate::validation::Validator;

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const PAGE_SIZE_PARAM: &str = "page[size]";
pub const PAGE_NUMBER_PARAM: &str = "page[number]";

/// Window into a collection, derived per request and never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
    /// 1-based page number.
    pub number: u64,
    /// Matching records at the time of the request.
    pub total: u64,
}

impl Pagination {
    pub fn last_page(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.limit)
        }
    }
}

/// The `id` path variable as an integer.
pub fn parse_id(vars: &Vars) -> Result<i64, ApiError> {
    let raw = vars
        .get("id")
        .ok_or_else(|| ApiError::integer_conversion("id", "missing id path segment"))?;
    raw.parse::<i64>()
        .map_err(|err| ApiError::integer_conversion("id", format!("parsing {raw:?}: {err}")))
}

/// Page window from `page[size]` (default 50) and `page[number]` (default 1).
/// An offset beyond `total` is rejected, not clamped.
pub fn page_window(query: &HashMap<String, String>, total: u64) -> Result<Pagination, ApiError> {
    let limit = match query.get(PAGE_SIZE_PARAM) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(size) if size > 0 => size,
            _ => return Err(ApiError::invalid_parameter(PAGE_SIZE_PARAM)),
        },
        None => DEFAULT_PAGE_SIZE,
    };
    let number = match query.get(PAGE_NUMBER_PARAM) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(page) if page >= 1 => page,
            _ => return Err(ApiError::invalid_parameter(PAGE_NUMBER_PARAM)),
        },
        None => 1,
    };
    let offset = (number - 1)
        .checked_mul(limit)
        .filter(|offset| *offset <= total)
        .ok_or_else(|| ApiError::invalid_parameter(PAGE_NUMBER_PARAM))?;
    Ok(Pagination {
        offset,
        limit,
        number,
        total,
    })
}

/// Count the collection and derive the requested page from the URI query.
pub async fn paginate<E: Entity>(datastore: &Datastore, uri: &Uri) -> Result<Pagination, ApiError> {
    let total = datastore.count_entities::<E>(&[]).await?;
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(uri)
        .map_err(|_| ApiError::invalid_parameter("page"))?;
    page_window(&query, total)
}

/// The whole request body. A body cut off by the size limit is 413; any
/// other read failure is malformed input.
pub async fn read_body(req: Request) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|err| {
            if exceeds_length_limit(&err) {
                ApiError::payload_too_large(err)
            } else {
                ApiError::malformated_input(err)
            }
        })
}

fn exceeds_length_limit(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

pub fn decode_entity<E: Entity>(body: &[u8]) -> Result<E, ApiError> {
    codec::decode(body).map_err(ApiError::malformated_input)
}

pub fn validate_entity<E: Entity>(entity: &E) -> Result<(), ApiError> {
    let attributes = codec::attributes(entity).map_err(|err| ApiError::validation(Some(err.to_string())))?;
    Validator::validate(&attributes, &E::validation_rules())?;
    Ok(())
}

/// Decode then validate a request document.
pub fn receive_entity<E: Entity>(body: &[u8]) -> Result<E, ApiError> {
    let entity = decode_entity(body)?;
    validate_entity(&entity)?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::show::Show;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_to_first_page_of_fifty() {
        let page = page_window(&HashMap::new(), 0).unwrap();
        assert_eq!((page.offset, page.limit, page.number), (0, 50, 1));
    }

    #[test]
    fn offset_is_page_minus_one_times_size() {
        for (number, size) in [(1u64, 1u64), (2, 10), (3, 7), (5, 20)] {
            let page = page_window(
                &query(&[(PAGE_NUMBER_PARAM, &number.to_string()), (PAGE_SIZE_PARAM, &size.to_string())]),
                1_000,
            )
            .unwrap();
            assert_eq!(page.offset, (number - 1) * size);
            assert_eq!(page.limit, size);
        }
    }

    #[test]
    fn offset_beyond_total_is_invalid() {
        let err = page_window(&query(&[(PAGE_NUMBER_PARAM, "3"), (PAGE_SIZE_PARAM, "10")]), 19).unwrap_err();
        assert_eq!(err.id, "invalid-parameter");
        assert_eq!(err.source.parameter.as_deref(), Some(PAGE_NUMBER_PARAM));
        assert!(page_window(&query(&[(PAGE_NUMBER_PARAM, "3"), (PAGE_SIZE_PARAM, "10")]), 20).is_ok());
    }

    #[test]
    fn rejects_bad_size_and_number() {
        for size in ["0", "-1", "ten", ""] {
            let err = page_window(&query(&[(PAGE_SIZE_PARAM, size)]), 10).unwrap_err();
            assert_eq!(err.source.parameter.as_deref(), Some(PAGE_SIZE_PARAM));
        }
        for number in ["0", "-2", "x"] {
            let err = page_window(&query(&[(PAGE_NUMBER_PARAM, number)]), 10).unwrap_err();
            assert_eq!(err.source.parameter.as_deref(), Some(PAGE_NUMBER_PARAM));
        }
        let huge = query(&[(PAGE_NUMBER_PARAM, "18446744073709551615"), (PAGE_SIZE_PARAM, "2")]);
        assert!(page_window(&huge, u64::MAX).is_err());
    }

    #[test]
    fn last_page_rounds_up() {
        let page = page_window(&query(&[(PAGE_SIZE_PARAM, "10")]), 21).unwrap();
        assert_eq!(page.last_page(), 3);
    }

    #[test]
    fn parse_id_rejects_overflow() {
        let vars = Vars::from_iter([("id".to_owned(), "999999999999999999999".to_owned())]);
        let err = parse_id(&vars).unwrap_err();
        assert_eq!(err.id, "integer-conversion");
        assert_eq!(err.source.parameter.as_deref(), Some("id"));
        let vars = Vars::from_iter([("id".to_owned(), "2147483647".to_owned())]);
        assert_eq!(parse_id(&vars).unwrap(), 2147483647);
    }

    #[tokio::test]
    async fn body_over_the_size_limit_is_payload_too_large() {
        use axum::body::Body;
        use http_body_util::Limited;

        let body = Body::new(Limited::new(Body::from("x".repeat(32)), 16));
        let req = Request::builder().method("POST").uri("/shows").body(body).unwrap();
        let err = read_body(req).await.unwrap_err();
        assert_eq!(err.id, "payload-too-large");
        assert_eq!(err.status_code(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);

        let body = Body::new(Limited::new(Body::from("x".repeat(16)), 16));
        let req = Request::builder().method("POST").uri("/shows").body(body).unwrap();
        assert_eq!(read_body(req).await.unwrap().len(), 16);
    }

    #[test]
    fn receive_reports_decode_then_validation_failures() {
        let err = receive_entity::<Show>(b"not json").unwrap_err();
        assert_eq!(err.id, "malformated-input");
        let err = receive_entity::<Show>(br#"{"data":{"type":"shows","attributes":{"year":1996}}}"#).unwrap_err();
        assert_eq!(err.id, "validation-error");
    }
}
