// QueryTrail - core/mod.rs
//
// Core logic layer: message model, filtering, span timing, table
// formatting, and the sink and executor capabilities.
// Must NOT depend on: app or platform.

pub mod explain;
pub mod export;
pub mod filter;
pub mod format;
pub mod model;
pub mod sink;
pub mod timing;
