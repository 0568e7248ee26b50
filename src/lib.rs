//! Core library for emby-ncm-bridge
pub mod api;
pub mod config;
pub mod error;
pub mod import;
pub mod matcher;
pub mod models;
pub mod playlist;
pub mod reference;
