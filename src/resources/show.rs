use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datastore::{Entity, Identifiable};
use crate::validation::{Format, ValidationRule};

use super::EntityResource;

/// A TV show.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Show {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Show {
    pub const DDL: &'static str = "CREATE TABLE IF NOT EXISTS shows (\
        id BIGSERIAL PRIMARY KEY, \
        title TEXT NOT NULL, \
        year BIGINT NOT NULL, \
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now())";
}

impl Identifiable for Show {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

impl Entity for Show {
    const TABLE: &'static str = "shows";
    const TYPE: &'static str = "shows";
    const TIMESTAMPS: bool = true;

    fn validation_rules() -> Vec<(&'static str, ValidationRule)> {
        vec![
            (
                "title",
                ValidationRule {
                    required: true,
                    format: Some(Format::Ascii),
                    ..Default::default()
                },
            ),
            (
                "year",
                ValidationRule {
                    required: true,
                    ..Default::default()
                },
            ),
        ]
    }
}

pub type ShowResource = EntityResource<Show>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::validate_entity;

    #[test]
    fn title_must_be_ascii() {
        let show = Show {
            title: "Amélie".into(),
            year: 2001,
            ..Show::default()
        };
        let err = validate_entity(&show).unwrap_err();
        assert_eq!(err.id, "validation-error");
        assert_eq!(err.source.pointer.as_deref(), Some("/data/attributes/title"));
    }

    #[test]
    fn year_is_required() {
        let show = Show {
            title: "Twin Peaks".into(),
            ..Show::default()
        };
        assert!(validate_entity(&show).is_err());
        let show = Show { year: 1990, ..show };
        assert!(validate_entity(&show).is_ok());
    }
}
