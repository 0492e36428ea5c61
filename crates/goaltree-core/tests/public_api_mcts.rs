use goaltree_core::{
    EvaluatedStep, Evaluation, NodeId, PlanTree, Score, SearchConfig, SelectionPolicy,
    StepContent, TERMINAL_LABEL, Verdict,
};

fn step(label: &str) -> StepContent {
    StepContent {
        label: label.to_string(),
        description: format!("{label} description"),
        explanation: format!("{label} explanation"),
        parent_ids: Vec::new(),
    }
}

fn evaluated(label: &str, coherence: Score) -> EvaluatedStep {
    EvaluatedStep {
        content: step(label),
        evaluation: Evaluation::single(
            Verdict::new(Score::Yes, "simple"),
            Verdict::new(coherence, "fit"),
            Verdict::new(Score::Yes, "needed"),
        ),
    }
}

#[test]
fn public_expansion_rounds_reach_completion() {
    let config = SearchConfig::default();
    let mut tree = PlanTree::new();

    let first = tree
        .commit_expansion(
            &config,
            &NodeId::root(),
            vec![
                evaluated("Collect reviews", Score::No),
                evaluated("Train classifier", Score::Yes),
            ],
        )
        .expect("first expansion");
    let selected = first.next_selection.expect("a node to expand");
    assert_eq!(selected.as_str(), "-1/1");

    let second = tree
        .commit_expansion(
            &config,
            &selected,
            vec![
                evaluated(TERMINAL_LABEL, Score::Yes),
                evaluated(TERMINAL_LABEL, Score::Yes),
            ],
        )
        .expect("second expansion");
    assert!(!second.complete);
    assert_eq!(second.next_selection, Some(NodeId::from("-1/0")));

    let third = tree
        .commit_expansion(
            &config,
            &NodeId::from("-1/0"),
            vec![evaluated(TERMINAL_LABEL, Score::Yes)],
        )
        .expect("third expansion");
    assert!(third.complete);
    assert_eq!(third.next_selection, None);
    assert_eq!(tree.root().expect("root").visits(), 5);
}

#[test]
fn public_best_path_follows_the_strongest_branch() {
    let config = SearchConfig {
        policy: SelectionPolicy::Greedy,
        ..SearchConfig::default()
    };
    let mut tree = PlanTree::new();
    let metrics = tree
        .commit_expansion(
            &config,
            &NodeId::root(),
            vec![
                evaluated("Weak", Score::Unparsed),
                evaluated("Strong", Score::Yes),
            ],
        )
        .expect("expansion");

    let best = metrics.best_path.expect("best path");
    assert_eq!(best.node_ids, vec![NodeId::from("-1/1"), NodeId::root()]);
    assert_eq!(best.value, 1.0);
}

#[test]
fn public_default_yaml_config_parses() {
    let config = SearchConfig::from_default_yaml().expect("default yaml should parse");
    assert_eq!(config.policy, SelectionPolicy::Uct);
    assert_eq!(config.max_steps, 5);
    assert_eq!(config.sample_count, 2);
    assert_eq!(config.exploration, 1.41);
}
