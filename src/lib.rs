//! Football match/player statistics pipeline: reconciles heterogeneous
//! scraped CSV exports into accumulated per-partition datasets and builds
//! the analysis-ready parquet extracts from them.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod join;
pub mod loader;
pub mod missing;
pub mod parquet_out;
pub mod schema;
pub mod scrape;
pub mod table;
pub mod update;
