pub mod migrations;
pub mod parquet;
pub mod schema;
