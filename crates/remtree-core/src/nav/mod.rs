//! Navigation: per-connection current path, expand state, visit history
//! and path reveal.

pub mod engine;
pub mod history;
pub mod reveal;
pub mod state;
