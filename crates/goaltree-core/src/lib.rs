mod tree;

pub use tree::error::TreeError;
pub use tree::evaluation::{Criterion, Evaluation, Score, Verdict, reward};
pub use tree::ids::{NodeId, ROOT_NODE_ID};
pub use tree::mcts::{EvaluatedStep, SearchConfig, SearchConfigError, StepMetrics};
pub use tree::path::{BestPath, normalized_path_value};
pub use tree::policy::{SelectionPolicy, greedy_score, uct_score};
pub use tree::search_tree::{DetachedSubtree, PlanTree};
pub use tree::snapshot::{SNAPSHOT_SCHEMA_VERSION, TreeSnapshot};
pub use tree::{Node, NodeStats, NodeTable, StepContent, TERMINAL_LABEL};
