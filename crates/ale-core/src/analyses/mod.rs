pub mod balanced;
pub mod clustering;
pub mod config;
pub mod contrast;
pub mod main_effect;
pub mod probabilistic;

use serde::{Deserialize, Serialize};

use crate::cutoff::CutoffPredictor;
use crate::error::{AleError, Result};
use crate::experiment::Experiment;
use crate::io::store::ResultStore;

pub use balanced::{balanced_contrast, default_target_n};
pub use clustering::ma_clustering;
pub use config::{AleConfig, ClusteringConfig};
pub use contrast::contrast;
pub use main_effect::main_effect;
pub use probabilistic::probabilistic_ale;

/// The analysis variants a project row can request. Parsed up front, so
/// an unknown kind fails at load time rather than mid-batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    MainEffect,
    Probabilistic,
    Contrast,
    BalancedContrast,
    Clustering,
}

/// One analysis row, resolved: the kind, the meta-analysis name(s), and
/// the experiment pool(s) it operates on. Contrast kinds carry two
/// names and two pools; the others carry one of each.
#[derive(Clone, Debug)]
pub struct AnalysisTask {
    pub kind: AnalysisKind,
    pub names: Vec<String>,
    pub pools: Vec<Vec<Experiment>>,
    /// Subsample size for probabilistic / balanced-contrast kinds.
    pub target_n: Option<usize>,
    /// Number of subsamples for the probabilistic kind; defaults to the
    /// configured `subsample_n`.
    pub sample_n: Option<usize>,
}

impl AnalysisTask {
    fn two(&self) -> Result<(&[String; 2], [Vec<Experiment>; 2])> {
        let names: &[String; 2] = self
            .names
            .as_slice()
            .try_into()
            .map_err(|_| AleError::Config("contrast requires exactly two names".into()))?;
        let pools: [Vec<Experiment>; 2] = self
            .pools
            .clone()
            .try_into()
            .map_err(|_| AleError::Config("contrast requires exactly two pools".into()))?;
        Ok((names, pools))
    }
}

/// Dispatch one task to its analysis operation.
pub fn run_analysis(
    store: &dyn ResultStore,
    task: &AnalysisTask,
    config: &AleConfig,
    clustering_config: &ClusteringConfig,
    predictor: Option<&dyn CutoffPredictor>,
    on_progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<()> {
    match task.kind {
        AnalysisKind::MainEffect => main_effect(
            store,
            &task.pools[0],
            &task.names[0],
            config,
            predictor,
            on_progress,
        ),
        AnalysisKind::Probabilistic => {
            let target_n = task.target_n.ok_or_else(|| {
                AleError::Config(format!(
                    "{}: probabilistic ALE requires a subsampling size",
                    task.names[0]
                ))
            })?;
            probabilistic_ale(
                store,
                &task.pools[0],
                &task.names[0],
                target_n,
                task.sample_n.unwrap_or(config.subsample_n),
                config,
                on_progress,
            )
        }
        AnalysisKind::Contrast => {
            let (names, pools) = task.two()?;
            contrast(store, &pools, names, config, predictor, on_progress)
        }
        AnalysisKind::BalancedContrast => {
            let (names, pools) = task.two()?;
            let target_n = task
                .target_n
                .unwrap_or_else(|| default_target_n(pools[0].len(), pools[1].len()));
            balanced_contrast(store, &pools, names, target_n, config, on_progress)
        }
        AnalysisKind::Clustering => ma_clustering(
            store,
            &task.pools[0],
            &task.names[0],
            config,
            clustering_config,
        ),
    }
}
