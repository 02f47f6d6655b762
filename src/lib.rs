pub mod api;
pub mod catalog;
pub mod config;
pub mod crit;
pub mod db;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod model;
pub mod rank;
pub mod rate_limit;
