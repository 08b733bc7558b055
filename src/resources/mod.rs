//! Resources served by the router: the generic CRUD resource over any
//! [`Entity`] and the bundled entities.

pub mod show;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::datastore::{Datastore, Entity, RecordId};
use crate::error::ApiError;
use crate::requests::{decode_entity, paginate, parse_id, read_body, receive_entity, validate_entity};
use crate::response;
use crate::router::{vars, Destroyable, Listable, Resource, Storable, Updatable, Viewable};

pub use show::{Show, ShowResource};

/// CRUD resource for `E`, backed by the shared datastore handle.
pub struct EntityResource<E> {
    datastore: Datastore,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityResource<E> {
    pub fn new(datastore: Datastore) -> Self {
        EntityResource {
            datastore,
            _entity: PhantomData,
        }
    }

    async fn list(&self, req: Request) -> Result<Response, ApiError> {
        let page = paginate::<E>(&self.datastore, req.uri()).await?;
        let entities = self
            .datastore
            .fetch_paged_entities::<E>(page.limit, page.offset, &[])
            .await?;
        Ok(response::send_page(req.uri().path(), &entities, &page))
    }

    async fn store(&self, req: Request) -> Result<Response, ApiError> {
        let collection = req.uri().path().trim_end_matches('/').to_owned();
        let body = read_body(req).await?;
        let mut entity: E = receive_entity(&body)?;
        self.datastore.store_entity(&mut entity).await?;
        let id = entity
            .id()
            .ok_or_else(|| ApiError::database("stored record has no id"))?;
        Ok(response::send_created(&entity, &format!("{collection}/{id}")))
    }

    async fn view(&self, req: Request) -> Result<Response, ApiError> {
        let id = parse_id(&vars(&req))?;
        let entity: E = self.datastore.fetch_entity(id).await?;
        Ok(response::send_entity(StatusCode::OK, &entity))
    }

    async fn update(&self, req: Request) -> Result<Response, ApiError> {
        let id = parse_id(&vars(&req))?;
        let body = read_body(req).await?;
        let entity: E = decode_entity(&body)?;
        if entity.id() != Some(id) {
            return Err(ApiError::UNMATCHING_IDS);
        }
        validate_entity(&entity)?;
        self.datastore.update_entity(&entity).await?;
        Ok(response::send_no_content())
    }

    async fn destroy(&self, req: Request) -> Result<Response, ApiError> {
        let id = parse_id(&vars(&req))?;
        self.datastore.delete_entity::<E, _>(&RecordId(id)).await?;
        Ok(response::send_no_content())
    }
}

#[async_trait]
impl<E: Entity> Listable for EntityResource<E> {
    async fn route_list(&self, req: Request) -> Response {
        self.list(req).await.into_response()
    }
}

#[async_trait]
impl<E: Entity> Storable for EntityResource<E> {
    async fn route_store(&self, req: Request) -> Response {
        self.store(req).await.into_response()
    }
}

#[async_trait]
impl<E: Entity> Viewable for EntityResource<E> {
    async fn route_view(&self, req: Request) -> Response {
        self.view(req).await.into_response()
    }
}

#[async_trait]
impl<E: Entity> Updatable for EntityResource<E> {
    async fn route_update(&self, req: Request) -> Response {
        self.update(req).await.into_response()
    }
}

#[async_trait]
impl<E: Entity> Destroyable for EntityResource<E> {
    async fn route_destroy(&self, req: Request) -> Response {
        self.destroy(req).await.into_response()
    }
}

impl<E: Entity> Resource for EntityResource<E> {
    fn listable(self: Arc<Self>) -> Option<Arc<dyn Listable>> {
        Some(self)
    }

    fn storable(self: Arc<Self>) -> Option<Arc<dyn Storable>> {
        Some(self)
    }

    fn viewable(self: Arc<Self>) -> Option<Arc<dyn Viewable>> {
        Some(self)
    }

    fn updatable(self: Arc<Self>) -> Option<Arc<dyn Updatable>> {
        Some(self)
    }

    fn destroyable(self: Arc<Self>) -> Option<Arc<dyn Destroyable>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ResourceRouter;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method};
    use serde_json::{json, Value};

    async fn setup() -> (ResourceRouter, Datastore) {
        let datastore = Datastore::in_memory();
        let mut router = ResourceRouter::new();
        router
            .add_resource("shows", Arc::new(ShowResource::new(datastore.clone())))
            .unwrap();
        (router, datastore)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        Request::builder().method(method).uri(uri).body(body).unwrap()
    }

    async fn json_body(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn show_doc(id: Option<&str>, title: &str, year: i64) -> Value {
        let mut data = json!({ "type": "shows", "attributes": { "title": title, "year": year } });
        if let Some(id) = id {
            data["id"] = json!(id);
        }
        json!({ "data": data })
    }

    #[tokio::test]
    async fn registers_all_five_routes_in_order() {
        let (router, _) = setup().await;
        let names: Vec<_> = router.routes().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["shows.list", "shows.store", "shows.view", "shows.update", "shows.delete"]
        );
    }

    #[tokio::test]
    async fn store_then_view() {
        let (router, _) = setup().await;
        let res = router
            .dispatch(request(Method::POST, "/shows", Some(show_doc(None, "Firefly", 2002))))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[header::LOCATION], "/shows/1");

        let res = router.dispatch(request(Method::GET, "/shows/1", None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["data"]["id"], "1");
        assert_eq!(body["data"]["attributes"]["title"], "Firefly");
    }

    #[tokio::test]
    async fn store_rejects_invalid_attributes() {
        let (router, datastore) = setup().await;
        let res = router
            .dispatch(request(Method::POST, "/shows", Some(show_doc(None, "", 2002))))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_body(res).await;
        assert_eq!(body["errors"][0]["id"], "validation-error");
        assert_eq!(datastore.count_entities::<Show>(&[]).await.unwrap(), 0);

        let res = router
            .dispatch(request(Method::POST, "/shows", Some(json!({ "data": 3 }))))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["errors"][0]["id"], "malformated-input");
    }

    #[tokio::test]
    async fn update_checks_ids_before_touching_the_store() {
        let (router, datastore) = setup().await;
        let mut show = Show {
            title: "Lost".into(),
            year: 2004,
            ..Show::default()
        };
        datastore.store_entity(&mut show).await.unwrap();

        let res = router
            .dispatch(request(Method::PATCH, "/shows/1", Some(show_doc(Some("2"), "Found", 2004))))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["errors"][0]["id"], "unmatching-ids");
        let stored: Show = datastore.fetch_entity(1).await.unwrap();
        assert_eq!(stored.title, "Lost");

        let res = router
            .dispatch(request(Method::PATCH, "/shows/1", Some(show_doc(Some("1"), "Found", 2004))))
            .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let stored: Show = datastore.fetch_entity(1).await.unwrap();
        assert_eq!(stored.title, "Found");

        let res = router
            .dispatch(request(Method::PATCH, "/shows/7", Some(show_doc(Some("7"), "Ghost", 2004))))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_pages_through_the_collection() {
        let (router, datastore) = setup().await;
        for year in 2000..2005 {
            let mut show = Show {
                title: format!("Show {year}"),
                year,
                ..Show::default()
            };
            datastore.store_entity(&mut show).await.unwrap();
        }

        let res = router
            .dispatch(request(Method::GET, "/shows?page[size]=2&page[number]=3", None))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["meta"]["total"], 5);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["attributes"]["year"], 2004);

        let res = router
            .dispatch(request(Method::GET, "/shows?page[size]=2&page[number]=9", None))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["errors"][0]["id"], "invalid-parameter");
    }

    #[tokio::test]
    async fn destroy_twice_is_not_found() {
        let (router, datastore) = setup().await;
        let mut show = Show {
            title: "Dollhouse".into(),
            year: 2009,
            ..Show::default()
        };
        datastore.store_entity(&mut show).await.unwrap();

        let res = router.dispatch(request(Method::DELETE, "/shows/1", None)).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = router.dispatch(request(Method::DELETE, "/shows/1", None)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["errors"][0]["id"], "not-found");
    }
}
