pub mod compactor;
pub mod config;
pub mod dto;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod wal;
