// QueryTrail - platform/mod.rs
//
// Platform abstraction layer: config directory resolution and config.toml.
// Dependencies: directories crate, target option types.

pub mod config;
