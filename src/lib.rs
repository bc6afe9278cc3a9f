// QueryTrail - lib.rs
//
// Library entry point. Hosts embed `app::target::LogExportTarget` with their
// own sink and data store; the binary in `main.rs` replays recorded streams.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
