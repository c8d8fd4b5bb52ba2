//! REST bindings for the IVCAP artifact, aspect, metadata, package and
//! service APIs: typed services over SQLite and the filesystem, JWT-scoped
//! endpoints, an axum server, a reqwest client and a clap CLI.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod endpoints;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod views;
