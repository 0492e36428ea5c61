use std::fmt;

use serde::{Deserialize, Serialize};

/// One evaluator's yes/no judgment.
/// Serialized as `-1`, `0` or `1` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Score {
    /// The evaluator's reply could not be parsed into Yes/No.
    Unparsed,
    No,
    Yes,
}

impl Score {
    pub fn value(self) -> i32 {
        match self {
            Score::Unparsed => -1,
            Score::No => 0,
            Score::Yes => 1,
        }
    }
}

impl From<Score> for i8 {
    fn from(score: Score) -> Self {
        score.value() as i8
    }
}

impl TryFrom<i8> for Score {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Score::Unparsed),
            0 => Ok(Score::No),
            1 => Ok(Score::Yes),
            other => Err(format!("score must be -1, 0 or 1, got {other}")),
        }
    }
}

/// The three judged dimensions of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Whether the step still needs decomposing. Depends on the child only.
    Complexity,
    /// Whether the child follows from its tree-parent.
    Coherence,
    /// Whether the step matters for the goal. Depends on the child only.
    Importance,
}

impl Criterion {
    pub const ALL: [Criterion; 3] = [
        Criterion::Complexity,
        Criterion::Coherence,
        Criterion::Importance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Complexity => "complexity",
            Criterion::Coherence => "coherence",
            Criterion::Importance => "importance",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A score plus the evaluator's rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: Score,
    pub rationale: String,
}

impl Verdict {
    pub fn new(score: Score, rationale: impl Into<String>) -> Self {
        Verdict {
            score,
            rationale: rationale.into(),
        }
    }
}

/// Evaluation record of a node: one verdict per ensemble member for every criterion.
/// A single-evaluator setup holds exactly one verdict per list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub complexity: Vec<Verdict>,
    pub coherence: Vec<Verdict>,
    pub importance: Vec<Verdict>,
}

impl Evaluation {
    /// Build a single-evaluator record.
    pub fn single(complexity: Verdict, coherence: Verdict, importance: Verdict) -> Self {
        Evaluation {
            complexity: vec![complexity],
            coherence: vec![coherence],
            importance: vec![importance],
        }
    }

    pub fn verdicts(&self, criterion: Criterion) -> &[Verdict] {
        match criterion {
            Criterion::Complexity => &self.complexity,
            Criterion::Coherence => &self.coherence,
            Criterion::Importance => &self.importance,
        }
    }

    pub fn verdicts_mut(&mut self, criterion: Criterion) -> &mut Vec<Verdict> {
        match criterion {
            Criterion::Complexity => &mut self.complexity,
            Criterion::Coherence => &mut self.coherence,
            Criterion::Importance => &mut self.importance,
        }
    }

    /// Sum of the ensemble's scores for one criterion.
    pub fn score_sum(&self, criterion: Criterion) -> i32 {
        self.verdicts(criterion)
            .iter()
            .map(|verdict| verdict.score.value())
            .sum()
    }

    /// Number of evaluators consulted per criterion.
    pub fn evaluator_count(&self) -> usize {
        Criterion::ALL
            .iter()
            .map(|criterion| self.verdicts(*criterion).len())
            .max()
            .unwrap_or(0)
    }

    /// Aggregate reward of this record, see [`reward`].
    pub fn reward(&self) -> f64 {
        reward(
            self.score_sum(Criterion::Complexity),
            self.score_sum(Criterion::Coherence),
            self.score_sum(Criterion::Importance),
            self.evaluator_count(),
        )
    }
}

/// `(complexity + coherence + importance) / (3 * evaluator_count)`.
/// Scores are sums across the ensemble, which keeps the reward roughly in `[-1, 1]`.
pub fn reward(complexity: i32, coherence: i32, importance: i32, evaluator_count: usize) -> f64 {
    if evaluator_count == 0 {
        return 0.0;
    }
    f64::from(complexity + coherence + importance) / (3.0 * evaluator_count as f64)
}
