//! Narrow interfaces to the external units of work.
//!
//! The engine never looks inside data preparation, model fitting or
//! evaluation. It calls these traits and records what they return.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Sizes of the prepared train/test split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    /// Rows in the training split.
    pub train_samples: u64,
    /// Rows in the test split.
    pub test_samples: u64,
}

/// The result of fitting a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    /// Experiment-tracking run id.
    pub run_id: String,
    /// Experiment-tracking experiment id.
    pub experiment_id: String,
    /// Accuracy on the training split.
    pub train_accuracy: f64,
    /// Weighted F1 on the training split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_f1: Option<f64>,
}

/// Scores of the persisted model on the test split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    /// Test accuracy.
    pub accuracy: f64,
    /// Weighted F1.
    pub f1_score: f64,
    /// Weighted precision.
    pub precision: f64,
    /// Weighted recall.
    pub recall: f64,
}

/// Produces the train/test split.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataPreparer: Send + Sync {
    /// Prepares the split and returns its sizes.
    async fn prepare(&self) -> anyhow::Result<SplitCounts>;
}

/// Fits a model and persists it out of band.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Trains a model.
    async fn train(&self) -> anyhow::Result<TrainingRun>;
}

/// Scores the persisted model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelEvaluator: Send + Sync {
    /// Evaluates the model on the test split.
    async fn evaluate(&self) -> anyhow::Result<EvaluationScores>;
}

/// The collaborators one pipeline instance talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Data preparation.
    pub preparer: Arc<dyn DataPreparer>,
    /// Model fitting.
    pub trainer: Arc<dyn ModelTrainer>,
    /// Model evaluation.
    pub evaluator: Arc<dyn ModelEvaluator>,
}

impl Collaborators {
    /// Bundles collaborators.
    #[must_use]
    pub fn new(
        preparer: Arc<dyn DataPreparer>,
        trainer: Arc<dyn ModelTrainer>,
        evaluator: Arc<dyn ModelEvaluator>,
    ) -> Self {
        Self {
            preparer,
            trainer,
            evaluator,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
