pub mod access;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod elevenlabs;
pub mod error;
pub mod extract;
pub mod models;
pub mod repo;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod state;
pub mod stats;
pub mod sync;
