//! Resource SDK: capability-based REST resource router with a generic CRUD
//! datastore layer and JSON:API error model.

pub mod app;
pub mod codec;
pub mod config;
pub mod datastore;
pub mod error;
pub mod requests;
pub mod resources;
pub mod response;
pub mod router;
pub mod sql;
pub mod validation;

pub use app::{bearer_guard, build_app, build_router, SetupError};
pub use config::ServerConfig;
pub use datastore::{
    connect_with_retry, ensure_database_exists, Datastore, Entity, Identifiable, MemoryStore, PgStore, StoreDriver,
    StoreError,
};
pub use error::{ApiError, ApiErrors, ConfigError};
pub use resources::{EntityResource, Show, ShowResource};
pub use router::{Handler, Middleware, Resource, ResourceRouter, Route, RouterError, Vars};
