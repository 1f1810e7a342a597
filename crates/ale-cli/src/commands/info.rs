use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;

use crate::project::Project;

#[derive(Args)]
pub struct InfoArgs {
    /// Project file (TOML)
    pub project: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let project = Project::load(&args.project)?;

    let total_foci: usize = project.experiments.iter().map(|e| e.focus_count()).sum();
    let total_subjects: u64 = project
        .experiments
        .iter()
        .map(|e| e.subjects as u64)
        .sum();

    println!("{}", style("Dataset").bold());
    println!("  Experiments:    {}", project.experiments.len());
    println!("  Total foci:     {total_foci}");
    println!("  Total subjects: {total_subjects}");
    if !project.experiments.is_empty() {
        println!(
            "  Mean subjects:  {:.1}",
            total_subjects as f64 / project.experiments.len() as f64
        );
    }

    let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in &project.experiments {
        for t in &e.tags {
            *tag_counts.entry(t.as_str()).or_default() += 1;
        }
    }
    if !tag_counts.is_empty() {
        println!("\n{}", style("Tags").bold());
        for (tag, count) in &tag_counts {
            println!("  {tag}: {count} experiments");
        }
    }

    println!("\n{}", style("Analyses").bold());
    for task in &project.tasks {
        let pools: Vec<String> = task.pools.iter().map(|p| p.len().to_string()).collect();
        println!(
            "  {:?} {} ({} experiments)",
            task.kind,
            task.names.join(" vs "),
            pools.join(" vs ")
        );
    }

    Ok(())
}
