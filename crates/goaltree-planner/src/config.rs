use std::{fs, path::Path};

use goaltree_core::{Criterion, StepContent};
use serde::{Deserialize, Serialize};

use crate::PlannerError;

const DEFAULT_EVAL_CONFIG_YAML: &str = include_str!("../config/eval.default.yaml");

const DEFAULT_COMPLEXITY_DEFINITION: &str = "A task is complex when it cannot be done in a single \
    text analysis step and has to be split into several sub-tasks, each handled by one model or \
    technique. Any other task is not complex.";

const DEFAULT_COHERENCE_DEFINITION: &str = "Two tasks are coherent in a sequence when the second \
    follows logically or thematically from the first, stays consistent with it and does not \
    introduce an unrelated or contradictory concept.";

const DEFAULT_IMPORTANCE_DEFINITION: &str = "A subtask is important when it is critical, \
    essential or clearly beneficial for reaching the final goal from a text analytics \
    perspective. Social, communication or otherwise optional tasks are not important.";

/// Natural-language definition handed to the judge of each criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriterionDefinitions {
    pub complexity: String,
    pub coherence: String,
    pub importance: String,
}

impl Default for CriterionDefinitions {
    fn default() -> Self {
        CriterionDefinitions {
            complexity: DEFAULT_COMPLEXITY_DEFINITION.to_string(),
            coherence: DEFAULT_COHERENCE_DEFINITION.to_string(),
            importance: DEFAULT_IMPORTANCE_DEFINITION.to_string(),
        }
    }
}

impl CriterionDefinitions {
    pub fn get(&self, criterion: Criterion) -> &str {
        match criterion {
            Criterion::Complexity => &self.complexity,
            Criterion::Coherence => &self.coherence,
            Criterion::Importance => &self.importance,
        }
    }
}

/// A user-labelled judgment shown to a judge before the real question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub node: StepContent,
    /// Tree-parent of `node`. Only coherence examples use it; `None` stands for the goal.
    #[serde(default)]
    pub parent: Option<StepContent>,
    /// The Yes/No answer to the criterion's question.
    pub user_evaluation: bool,
    #[serde(default)]
    pub user_reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FewShotExamples {
    pub complexity: Vec<FewShotExample>,
    pub coherence: Vec<FewShotExample>,
    pub importance: Vec<FewShotExample>,
}

impl FewShotExamples {
    pub fn get(&self, criterion: Criterion) -> &[FewShotExample] {
        match criterion {
            Criterion::Complexity => &self.complexity,
            Criterion::Coherence => &self.coherence,
            Criterion::Importance => &self.importance,
        }
    }
}

/// Evaluator configuration: criterion definitions and few-shot examples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub definitions: CriterionDefinitions,
    pub few_shot: FewShotExamples,
}

impl EvalConfig {
    /// Parse an evaluator config from YAML text. Missing sections keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PlannerError> {
        let config: EvalConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse an evaluator config from a YAML file path.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, PlannerError> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_EVAL_CONFIG_YAML
    }

    pub fn from_default_yaml() -> Result<Self, PlannerError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), PlannerError> {
        for criterion in Criterion::ALL {
            if self.definitions.get(criterion).trim().is_empty() {
                return Err(PlannerError::Evaluation(format!(
                    "{criterion} definition must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Trim the majority class so positive and negative examples differ by at most `max_diff`.
/// The minority class comes first when trimming happens; otherwise the input order is kept.
pub fn balance_few_shot(examples: &[FewShotExample], max_diff: usize) -> Vec<FewShotExample> {
    let (positive, negative): (Vec<_>, Vec<_>) = examples
        .iter()
        .cloned()
        .partition(|example| example.user_evaluation);

    if positive.len() > negative.len() + max_diff {
        let keep = negative.len() + max_diff;
        negative.into_iter().chain(positive.into_iter().take(keep)).collect()
    } else if negative.len() > positive.len() + max_diff {
        let keep = positive.len() + max_diff;
        positive.into_iter().chain(negative.into_iter().take(keep)).collect()
    } else {
        examples.to_vec()
    }
}
