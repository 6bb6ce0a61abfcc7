pub mod api;
pub mod auth;
pub mod extract;
pub mod handlers;
pub mod logging;
pub mod migrator;
pub mod models;
pub mod naming;
pub mod orm;
pub mod request_log;
pub mod requests;
pub mod router;
pub mod routes;
pub mod schema;
pub mod settings;
