use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ale_core::analyses::run_analysis;
use ale_core::cutoff::CutoffPredictor;
use ale_core::io::store::FsStore;

use crate::project::Project;

#[derive(Args)]
pub struct RunArgs {
    /// Project file (TOML)
    pub project: PathBuf,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let project = Project::load(&args.project)?;
    let store = FsStore::new(&project.results_dir)
        .with_context(|| format!("opening result store {}", project.results_dir.display()))?;

    info!(
        experiments = project.experiments.len(),
        analyses = project.tasks.len(),
        "project loaded"
    );

    for (idx, task) in project.tasks.iter().enumerate() {
        println!(
            "[{}/{}] {:?}: {}",
            idx + 1,
            project.tasks.len(),
            task.kind,
            task.names.join(" vs ")
        );

        let pb = ProgressBar::new(project.config.monte_carlo_iterations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("Simulating null [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        let on_progress = |done: usize| pb.set_position(done as u64);

        let predictor = project
            .predictor
            .as_ref()
            .map(|p| p as &dyn CutoffPredictor);

        run_analysis(
            &store,
            task,
            &project.config,
            &project.clustering_config,
            predictor,
            Some(&on_progress),
        )?;
        pb.finish_and_clear();
    }

    println!("Analysis completed.");
    Ok(())
}
