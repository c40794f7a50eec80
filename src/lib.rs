pub mod api;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod humanize;
pub mod imaging;
pub mod observability;
pub mod signature;
pub mod source;
