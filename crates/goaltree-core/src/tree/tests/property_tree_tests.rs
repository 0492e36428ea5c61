use proptest::prelude::*;

use super::expand;
use crate::{PlanTree, TERMINAL_LABEL};

proptest! {
    #[test]
    fn backpropagate_then_retract_is_identity_on_ancestors(
        prior in proptest::collection::vec(-1.0f64..1.0, 0..16),
        rewards in proptest::collection::vec(-1.0f64..1.0, 1..32),
    ) {
        let mut tree = PlanTree::new();
        let root = tree.root_id().clone();
        let parent = expand(&mut tree, &root, &["Parent", "Sibling"]);
        let target = expand(&mut tree, &parent[0], &["Target"]).remove(0);

        for reward in &prior {
            tree.backpropagate(&parent[1], *reward).expect("backprop");
        }
        let ancestors_before: Vec<_> = [&parent[0], &root]
            .iter()
            .map(|id| *tree.lookup(id).expect("ancestor").stats())
            .collect();

        for reward in &rewards {
            tree.backpropagate(&target, *reward).expect("backprop");
        }
        let (visits, _) = tree.retract(&target).expect("retract");
        prop_assert_eq!(visits, rewards.len() as u64);

        for (id, before) in [&parent[0], &root].iter().zip(&ancestors_before) {
            let after = tree.lookup(id).expect("ancestor").stats();
            prop_assert_eq!(after.visits(), before.visits());
            prop_assert!((after.value() - before.value()).abs() < 1e-9);
        }
    }

    #[test]
    fn visits_count_every_descendant_evaluation(
        layout in proptest::collection::vec(1usize..4, 1..4),
    ) {
        let mut tree = PlanTree::new();
        let mut frontier = tree.root_id().clone();
        let mut evaluations = 0u64;

        for width in layout {
            let labels: Vec<String> = (0..width).map(|i| format!("step {i}")).collect();
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let children = expand(&mut tree, &frontier, &labels);
            for child in &children {
                tree.backpropagate(child, 0.5).expect("backprop");
                evaluations += 1;
            }
            frontier = children[0].clone();
        }

        let root = tree.root().expect("root");
        prop_assert_eq!(root.visits(), evaluations);
        for node in tree.table() {
            prop_assert!(node.visits() <= root.visits());
            if let Some(parent_id) = node.tree_parent_id() {
                let parent = tree.lookup(parent_id).expect("parent");
                prop_assert!(parent.tree_child_ids().contains(node.id()));
                prop_assert!(parent.visits() >= node.visits());
            }
        }
    }

    #[test]
    fn stored_terminal_flags_match_the_recursive_definition(
        terminal_mask in proptest::collection::vec(any::<bool>(), 4),
    ) {
        let mut tree = PlanTree::new();
        let root = tree.root_id().clone();
        let level_one = expand(&mut tree, &root, &["A", "B"]);
        for (i, parent) in level_one.iter().enumerate() {
            let labels: Vec<&str> = terminal_mask[i * 2..i * 2 + 2]
                .iter()
                .map(|end| if *end { TERMINAL_LABEL } else { "Work" })
                .collect();
            expand(&mut tree, parent, &labels);
        }

        for node in tree.table() {
            let recursive = tree.all_descendants_terminal(node.id()).expect("check");
            prop_assert_eq!(node.all_descendants_terminal(), recursive);
        }
        prop_assert_eq!(
            tree.is_complete().expect("root"),
            terminal_mask.iter().all(|end| *end)
        );
    }
}
