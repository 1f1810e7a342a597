use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use ale_core::analyses::{AleConfig, AnalysisKind, AnalysisTask, ClusteringConfig};
use ale_core::cutoff::{Cutoffs, FixedCutoffs};
use ale_core::experiment::{select_by_tags, Experiment};
use ale_core::template::{apply_affine, invert_affine, mm_to_voxel, Affine};

/// ICBM-to-Talairach transform (Lancaster, SPM variant); Talairach
/// coordinates convert to MNI through its inverse.
const ICBM2TAL: Affine = [
    [0.9254, 0.0024, -0.0118, -1.0207],
    [-0.0048, 0.9316, -0.0871, -1.7667],
    [0.0152, 0.0883, 0.8924, 4.0926],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoordinateSpace {
    #[default]
    Mni,
    Tal,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentRow {
    article: String,
    subjects: u32,
    #[serde(default)]
    space: CoordinateSpace,
    /// Millimeter-space coordinates, one [x, y, z] per focus.
    coordinates: Vec<[f64; 3]>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisRow {
    kind: AnalysisKind,
    #[serde(default)]
    name: Option<String>,
    /// Contrast kinds: the two meta-analysis names.
    #[serde(default)]
    names: Option<[String; 2]>,
    /// Tag filter for the (first) experiment pool.
    #[serde(default)]
    tags: Vec<String>,
    /// Tag filter for the second pool of contrast kinds.
    #[serde(default)]
    second_tags: Vec<String>,
    #[serde(default)]
    target_n: Option<usize>,
    #[serde(default)]
    sample_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PredictedCutoffs {
    voxel: f64,
    cluster: f64,
    #[serde(default)]
    tfce: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    /// Results directory, relative to the project file.
    #[serde(default = "default_results_dir")]
    results: PathBuf,
    #[serde(default)]
    parameters: AleConfig,
    #[serde(default)]
    clustering_parameters: ClusteringConfig,
    /// Externally supplied cutoffs, honored when
    /// `cutoff_predict_enabled` is set.
    #[serde(default)]
    predicted_cutoffs: Option<PredictedCutoffs>,
    experiments: Vec<ExperimentRow>,
    analyses: Vec<AnalysisRow>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// A loaded, validated project: the experiment table in voxel space, the
/// analysis rows resolved into tasks, and the configuration.
pub struct Project {
    pub results_dir: PathBuf,
    pub config: AleConfig,
    pub clustering_config: ClusteringConfig,
    pub predictor: Option<FixedCutoffs>,
    pub experiments: Vec<Experiment>,
    pub tasks: Vec<AnalysisTask>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading project file {}", path.display()))?;
        let file: ProjectFile = toml::from_str(&text)
            .with_context(|| format!("parsing project file {}", path.display()))?;

        file.parameters
            .validate()
            .context("invalid [parameters] section")?;

        let experiments = ingest_experiments(&file.experiments, &file.parameters)?;
        let tasks = resolve_tasks(&file.analyses, &experiments)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let predictor = file
            .predicted_cutoffs
            .map(|p| {
                FixedCutoffs(Cutoffs {
                    voxel: p.voxel,
                    cluster: p.cluster,
                    tfce: p.tfce,
                })
            });

        Ok(Self {
            results_dir: base.join(&file.results),
            config: file.parameters,
            clustering_config: file.clustering_parameters,
            predictor,
            experiments,
            tasks,
        })
    }
}

/// Convert Talairach millimeter coordinates to MNI space.
fn tal_to_mni(mm: [f64; 3]) -> [f64; 3] {
    let inv = invert_affine(&ICBM2TAL).expect("ICBM2TAL is invertible");
    apply_affine(&inv, mm)
}

/// Validate and transform the experiment table into voxel space.
/// Malformed rows are fatal; out-of-grid coordinates only clamp.
fn ingest_experiments(rows: &[ExperimentRow], config: &AleConfig) -> Result<Vec<Experiment>> {
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let describe = || format!("experiment row {} ('{}')", idx + 1, row.article);

        if row.coordinates.is_empty() {
            bail!("{}: no coordinates", describe());
        }
        for (c_idx, mm) in row.coordinates.iter().enumerate() {
            if mm.iter().any(|v| !v.is_finite()) {
                bail!("{}: coordinate {} is not finite", describe(), c_idx + 1);
            }
        }

        let foci: Vec<[usize; 3]> = row
            .coordinates
            .iter()
            .map(|&mm| {
                let mni = match row.space {
                    CoordinateSpace::Mni => mm,
                    CoordinateSpace::Tal => tal_to_mni(mm),
                };
                mm_to_voxel(&config.grid, mni)
            })
            .collect();

        let experiment = Experiment::new(row.article.clone(), row.subjects, foci)
            .with_context(describe)?
            .with_tags(row.tags.clone());
        out.push(experiment);
    }
    Ok(out)
}

fn resolve_tasks(rows: &[AnalysisRow], experiments: &[Experiment]) -> Result<Vec<AnalysisTask>> {
    let mut tasks = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let describe = || format!("analysis row {} ({:?})", idx + 1, row.kind);

        let task = match row.kind {
            AnalysisKind::Contrast | AnalysisKind::BalancedContrast => {
                let names = row
                    .names
                    .clone()
                    .with_context(|| format!("{}: 'names' is required", describe()))?;
                let pool_a = select_by_tags(experiments, &row.tags);
                let pool_b = select_by_tags(experiments, &row.second_tags);
                if pool_a.is_empty() || pool_b.is_empty() {
                    bail!("{}: a pool selected no experiments", describe());
                }
                AnalysisTask {
                    kind: row.kind,
                    names: names.to_vec(),
                    pools: vec![pool_a, pool_b],
                    target_n: row.target_n,
                    sample_n: row.sample_n,
                }
            }
            _ => {
                let name = row
                    .name
                    .clone()
                    .with_context(|| format!("{}: 'name' is required", describe()))?;
                let pool = select_by_tags(experiments, &row.tags);
                if pool.is_empty() {
                    bail!("{}: selected no experiments", describe());
                }
                AnalysisTask {
                    kind: row.kind,
                    names: vec![name],
                    pools: vec![pool],
                    target_n: row.target_n,
                    sample_n: row.sample_n,
                }
            }
        };
        tasks.push(task);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_text() -> &'static str {
        r#"
            results = "out"

            [parameters]
            monte_carlo_iterations = 50
            tfce_enabled = false

            [[experiments]]
            article = "Smith 2004"
            subjects = 12
            coordinates = [[-2.0, 50.0, 10.0], [34.0, -20.0, 44.0]]
            tags = ["visual"]

            [[experiments]]
            article = "Jones 2009"
            subjects = 20
            space = "TAL"
            coordinates = [[10.0, 12.0, -8.0]]
            tags = ["auditory"]

            [[analyses]]
            kind = "main_effect"
            name = "visual"
            tags = ["visual"]
        "#
    }

    #[test]
    fn loads_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(&path, project_text()).unwrap();

        let project = Project::load(&path).unwrap();
        assert_eq!(project.experiments.len(), 2);
        assert_eq!(project.tasks.len(), 1);
        assert_eq!(project.config.monte_carlo_iterations, 50);
        assert_eq!(project.tasks[0].pools[0].len(), 1);
        assert_eq!(project.tasks[0].pools[0][0].article, "Smith 2004");
    }

    #[test]
    fn tal_conversion_moves_coordinates() {
        let tal = [10.0, 12.0, -8.0];
        let mni = tal_to_mni(tal);
        // The Lancaster transform is close to identity but not identity.
        assert!((mni[0] - tal[0]).abs() > 0.1 || (mni[1] - tal[1]).abs() > 0.1);
        // Round trip through the forward matrix restores the input.
        let back = apply_affine(&ICBM2TAL, mni);
        for a in 0..3 {
            assert!((back[a] - tal[a]).abs() < 1e-9);
        }
    }

    #[test]
    fn out_of_grid_coordinate_clamps() {
        let config = AleConfig::default();
        let rows = vec![ExperimentRow {
            article: "edge".into(),
            subjects: 10,
            space: CoordinateSpace::Mni,
            coordinates: vec![[500.0, 500.0, 500.0]],
            tags: vec![],
        }];
        let exps = ingest_experiments(&rows, &config).unwrap();
        let [i, j, k] = exps[0].foci[0];
        assert!(i < config.grid.shape[0]);
        assert!(j < config.grid.shape[1]);
        assert!(k < config.grid.shape[2]);
    }

    #[test]
    fn zero_subjects_is_fatal() {
        let config = AleConfig::default();
        let rows = vec![ExperimentRow {
            article: "bad".into(),
            subjects: 0,
            space: CoordinateSpace::Mni,
            coordinates: vec![[0.0, 0.0, 0.0]],
            tags: vec![],
        }];
        assert!(ingest_experiments(&rows, &config).is_err());
    }

    #[test]
    fn unknown_analysis_kind_fails_at_parse() {
        let text = r#"
            [[experiments]]
            article = "a"
            subjects = 5
            coordinates = [[0.0, 0.0, 0.0]]

            [[analyses]]
            kind = "mystery"
            name = "x"
        "#;
        let parsed: std::result::Result<ProjectFile, _> = toml::from_str(text);
        assert!(parsed.is_err());
    }
}
