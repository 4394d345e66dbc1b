//! Tree materialization for a UI.
//!
//! [`materializer::TreeMaterializer`] turns cached listings, navigation state
//! and the filter overlay into [`node::TreeNode`]s on demand.

pub mod materializer;
pub mod node;
