pub mod chunks;
pub mod config;
pub mod error;
pub mod experiment;
pub mod jsonio;
pub mod records;
