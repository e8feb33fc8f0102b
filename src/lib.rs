pub mod adapter;
pub mod api;
pub mod config;
pub mod db;
pub mod mcp;
pub mod models;
