mod arena;
pub mod error;
pub mod evaluation;
pub mod ids;
pub mod mcts;
mod node;
pub mod path;
pub mod policy;
mod render;
pub mod search_tree;
pub mod snapshot;
mod stats;

pub use arena::NodeTable;
pub use node::{Node, StepContent, TERMINAL_LABEL};
pub use stats::NodeStats;

#[cfg(test)]
mod tests;
