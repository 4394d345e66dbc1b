//! Name filtering and highlighting.
//!
//! - [`pattern`]: the substring/glob [`NamePattern`](pattern::NamePattern).
//! - [`folder`]: scoped per-folder filters and their highlight sets.
//! - [`overlay`]: composes the quick filter with every active per-folder
//!   filter into a per-node [`NodeDecoration`](overlay::NodeDecoration).
//! - [`search`]: explicit, abortable remote search for the quick filter.

pub mod folder;
pub mod overlay;
pub mod pattern;
pub mod search;
