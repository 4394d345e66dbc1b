//! Configuration management for remtree.
//!
//! Engine settings ([`settings::Config`]) are stored as a TOML file and
//! loaded at session start.

pub mod settings;
