// QueryTrail - app/mod.rs
//
// Application layer: the export target and the replay driver.
// Dependencies: core layer.

pub mod replay;
pub mod target;
