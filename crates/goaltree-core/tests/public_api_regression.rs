use goaltree_core::{
    EvaluatedStep, Evaluation, NodeId, PlanTree, Score, SearchConfig, StepContent, TreeError,
    TreeSnapshot, Verdict,
};

fn evaluated(label: &str) -> EvaluatedStep {
    EvaluatedStep {
        content: StepContent {
            label: label.to_string(),
            description: String::new(),
            explanation: String::new(),
            parent_ids: Vec::new(),
        },
        evaluation: Evaluation::single(
            Verdict::new(Score::Yes, "a"),
            Verdict::new(Score::Yes, "b"),
            Verdict::new(Score::No, "c"),
        ),
    }
}

#[test]
fn public_snapshot_rehydrates_to_the_same_tree() {
    let config = SearchConfig::default();
    let mut tree = PlanTree::new();
    tree.commit_expansion(
        &config,
        &NodeId::root(),
        vec![evaluated("Collect"), evaluated("Label")],
    )
    .expect("expansion");

    let json = tree.snapshot().to_json().expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["rootId"], "-1");
    assert_eq!(value["nodes"]["-1/1"]["treeParentId"], "-1");
    assert_eq!(value["nodes"]["-1/1"]["modelEvaluation"]["importance"][0]["score"], 0);

    let restored =
        PlanTree::from_snapshot(TreeSnapshot::from_json(&json).expect("deserialize"))
            .expect("rehydrate");
    assert_eq!(restored, tree);
    assert_eq!(
        restored.next_selection(&config).expect("select"),
        tree.next_selection(&config).expect("select")
    );
}

#[test]
fn public_regeneration_of_unknown_node_fails_fast() {
    let config = SearchConfig::default();
    let mut tree = PlanTree::new();
    let before = tree.clone();

    let err = tree
        .commit_regeneration(&config, &NodeId::from("-1/3"), evaluated("Ghost"))
        .expect_err("unknown node");
    assert_eq!(
        err,
        TreeError::MissingNode {
            node_id: NodeId::from("-1/3")
        }
    );
    assert_eq!(tree, before);
}

#[test]
fn public_expansion_of_unknown_parent_inserts_nothing() {
    let config = SearchConfig::default();
    let mut tree = PlanTree::new();

    let err = tree
        .commit_expansion(&config, &NodeId::from("-1/0"), vec![evaluated("Orphan")])
        .expect_err("unknown parent");
    assert!(matches!(err, TreeError::MissingNode { .. }));
    assert_eq!(tree.node_count(), 1);
}
