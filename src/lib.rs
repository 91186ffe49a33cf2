// src/lib.rs

pub mod api;
pub mod app_state;
pub mod cache;
pub mod compression;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod redis_conn;
pub mod service;
pub mod storage;
pub mod token;
