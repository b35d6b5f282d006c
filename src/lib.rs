pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod grants;
pub mod output;
pub mod query;
pub mod sanitize;
pub mod workbook;
