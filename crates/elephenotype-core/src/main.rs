use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use elephenotype_core::batch::RequestBuilder;
use elephenotype_core::compiler::DatasetCompiler;
use elephenotype_core::config::{validate_split_ratios, PipelineConfig};
use elephenotype_core::slicer::{discover_repositories, SliceCollection, SliceStatistics, Slicer};

#[derive(Parser, Debug)]
#[command(
    name = "elephenotype",
    version,
    about = "Build instruction-tuning datasets from Python repositories"
)]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long, default_value = "elephenotype.json")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Slice one repository into code_slices JSONL
    Slice {
        #[arg(long)]
        repo: PathBuf,
        /// Repository name used in slice identifiers (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        max_files: Option<usize>,
        /// Output file (defaults to {slices_dir}/{name}/code_slices.jsonl)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Slice every repository under the configured repos directory
    SliceAll {
        #[arg(long)]
        max_files: Option<usize>,
        /// Worker threads, one repository per task
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Write batch API input files from exported slices
    Prepare {
        /// Slice JSONL file or directory of them
        #[arg(long)]
        slices: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Compile batch outputs into train/validation datasets
    Compile {
        #[arg(long)]
        batch_output_dir: Option<PathBuf>,
        #[arg(long)]
        source_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        train_ratio: Option<f64>,
        #[arg(long)]
        val_ratio: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_statistics(stats: &SliceStatistics) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn repo_name(repo: &Path) -> String {
    repo.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(repo)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string())
}

fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    match cli.command {
        Command::Slice {
            repo,
            name,
            max_files,
            output,
        } => {
            let name = name.unwrap_or_else(|| repo_name(&repo));
            let slicer = Slicer::new(config.analysis.clone());
            let max_files = max_files.or(config.analysis.max_files_per_repo);
            let slices = slicer
                .slice_repository(&repo, &name, max_files)
                .with_context(|| format!("failed to slice {}", repo.display()))?;
            let collection: SliceCollection = slices.into_iter().collect();
            let output = output
                .unwrap_or_else(|| config.paths.slices_dir.join(&name).join("code_slices.jsonl"));
            collection.export_jsonl(&output)?;
            println!("Wrote {} slices to {}", collection.len(), output.display());
            print_statistics(&collection.statistics())?;
        }
        Command::SliceAll { max_files, workers } => {
            let repos = discover_repositories(&config.paths.repos_dir)?;
            info!("Slicing {} repositories", repos.len());
            let slicer = Slicer::new(config.analysis.clone());
            let max_files = max_files.or(config.analysis.max_files_per_repo);
            let run = slicer.slice_repositories(&repos, max_files, workers);
            for (name, err) in &run.failures {
                error!("Repository {name} failed: {err}");
            }
            for (name, _) in &run.per_repository {
                let repo_slices: SliceCollection = run
                    .collection
                    .slices()
                    .iter()
                    .filter(|s| &s.repository == name)
                    .cloned()
                    .collect();
                if repo_slices.is_empty() {
                    continue;
                }
                let output = config.paths.slices_dir.join(name).join("code_slices.jsonl");
                repo_slices.export_jsonl(&output)?;
            }
            println!(
                "Sliced {} repositories into {} slices",
                run.per_repository.len(),
                run.collection.len()
            );
            print_statistics(&run.collection.statistics())?;
        }
        Command::Prepare { slices, output_dir } => {
            let slices = slices.unwrap_or_else(|| config.paths.slices_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.paths.batch_input_dir.clone());
            let collection = SliceCollection::load_path(&slices)
                .with_context(|| format!("failed to load slices from {}", slices.display()))?;
            let builder = RequestBuilder::new(config.generation.clone());
            let prepared = builder.prepare(collection.slices(), &output_dir)?;
            for batch in &prepared {
                println!("{}: {} requests -> {}", batch.scenario, batch.requests, batch.path.display());
            }
        }
        Command::Compile {
            batch_output_dir,
            source_dir,
            output_dir,
            train_ratio,
            val_ratio,
            seed,
        } => {
            let mut compilation = config.compilation.clone();
            if let Some(ratio) = train_ratio {
                compilation.train_ratio = ratio;
            }
            if let Some(ratio) = val_ratio {
                compilation.val_ratio = ratio;
            }
            if let Some(seed) = seed {
                compilation.random_seed = seed;
            }
            validate_split_ratios(compilation.train_ratio, compilation.val_ratio)?;

            let batch_output_dir =
                batch_output_dir.unwrap_or_else(|| config.paths.batch_output_dir.clone());
            let source_dir = source_dir.unwrap_or_else(|| config.paths.slices_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.paths.final_output_dir.clone());

            let compiler = DatasetCompiler::new(output_dir, compilation);
            let report = compiler
                .process_all_outputs(&batch_output_dir, &source_dir)
                .context("dataset compilation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
