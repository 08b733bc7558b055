//! JSON:API document codec: entities to and from `{"data": {type, id, attributes}}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::datastore::Entity;
use crate::requests::{Pagination, PAGE_NUMBER_PARAM, PAGE_SIZE_PARAM};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("resource type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("resource id must be an integer, found '{0}'")]
    InvalidId(String),
    #[error("{0} does not serialize to an object")]
    NotAnObject(&'static str),
}

/// A single resource inside a document's `data` member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Deserialize)]
struct Incoming {
    data: ResourceObject,
}

/// Top-level response document.
#[derive(Debug, Serialize)]
pub struct Document<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl<T> Document<T> {
    pub fn new(data: T) -> Self {
        Document {
            data,
            meta: None,
            links: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_links(mut self, links: Links) -> Self {
        self.links = Some(links);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_: String,
    pub first: String,
    pub last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Links {
    pub fn for_page(path: &str, page: &Pagination) -> Self {
        let link = |number: u64| {
            format!(
                "{}?{}={}&{}={}",
                path, PAGE_NUMBER_PARAM, number, PAGE_SIZE_PARAM, page.limit
            )
        };
        let last = page.last_page();
        Links {
            self_: link(page.number),
            first: link(1),
            last: link(last),
            prev: (page.number > 1).then(|| link(page.number - 1)),
            next: (page.number < last).then(|| link(page.number + 1)),
        }
    }
}

/// Decode a request document into `E`. The document id, when present, must be
/// an integer and becomes the entity's identity.
pub fn decode<E: Entity>(body: &[u8]) -> Result<E, CodecError> {
    let incoming: Incoming = serde_json::from_slice(body)?;
    let data = incoming.data;
    if data.kind != E::TYPE {
        return Err(CodecError::TypeMismatch {
            expected: E::TYPE,
            found: data.kind,
        });
    }
    let mut fields = data.attributes;
    fields.remove("id");
    if let Some(id) = data.id {
        let parsed: i64 = id.trim().parse().map_err(|_| CodecError::InvalidId(id.clone()))?;
        fields.insert("id".to_owned(), Value::from(parsed));
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

pub fn encode<E: Entity>(entity: &E) -> Result<ResourceObject, CodecError> {
    Ok(ResourceObject {
        kind: E::TYPE.to_owned(),
        id: entity.id().map(|id| id.to_string()),
        attributes: attributes(entity)?,
    })
}

/// The entity's fields without its identity.
pub fn attributes<E: Entity>(entity: &E) -> Result<Map<String, Value>, CodecError> {
    match serde_json::to_value(entity)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        _ => Err(CodecError::NotAnObject(E::TYPE)),
    }
}
