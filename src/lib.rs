//! Apigen SDK: metadata-driven REST resource layer over an ORM-style class registry.

pub mod api;
pub mod case;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod listener;
pub mod metadata;
pub mod orm;
pub mod provider;
pub mod query;
pub mod request;
pub mod response;
pub mod routes;
pub mod serializer;
pub mod service;
pub mod sql;
pub mod state;

#[cfg(test)]
mod testing;

pub use api::{Api, Target};
pub use config::{load_from_dir, resolve, FullConfig, Settings};
pub use error::{AppError, ConfigError};
pub use response::{success_collection, success_one, success_one_ok};
pub use routes::{common_routes, common_routes_with_ready, resource_routes};
pub use service::{DataPersister, OrmDataPersister, PgExecutor, QueryExecutor};
pub use state::AppState;
