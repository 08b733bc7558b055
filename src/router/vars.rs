//! Named path-segment captures of the matched route.

use std::collections::HashMap;
use std::convert::Infallible;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, extract::Request, http::request::Parts};

/// Variables captured by the matched route pattern, e.g. `id` in `/shows/{id:[0-9]+}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vars(HashMap<String, String>);

impl Vars {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Vars(iter.into_iter().collect())
    }
}

/// Variables of the route that matched `req`; empty outside a matched route.
pub fn vars(req: &Request) -> Vars {
    req.extensions().get::<Vars>().cloned().unwrap_or_default()
}

#[async_trait]
impl<S> FromRequestParts<S> for Vars
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Vars>().cloned().unwrap_or_default())
    }
}
