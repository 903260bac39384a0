//! Elicit Eval - gesture description study pipeline
//!
//! Loads elicitation records, produces descriptions and predictions, scores
//! them against ground truth and writes the statistical report.

use anyhow::Context;
use elicit_eval::app::cli::{Cli, Commands, ConfigAction, DescribeFrom, PredictWith};
use elicit_eval::app::config::Config;
use elicit_eval::extraction::FrameSource;
use elicit_eval::report::{self, render_statistics, tables, OutputDirs, RunSummary};
use elicit_eval::scoring::aggregation::METRIC_ACCURACY;
use elicit_eval::workflow::{Pipeline, PipelineInputs};
use elicit_eval::{DescriptionSource, PredictorSource};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first so we can use --verbose to set log level
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if cli.config.is_some() {
        Config::load(&config_path).with_context(|| format!("reading config {}", config_path.display()))?
    } else {
        Config::load_default()?
    };

    match cli.command {
        Commands::Load { records, ground_truth } => {
            run_load(&records, &ground_truth, &config)?;
        }
        Commands::Describe {
            from,
            input,
            records,
            ground_truth,
            output,
            model,
            frames,
            stage,
        } => {
            let frames = frames.map(|root| FrameSource { root, stage });
            run_describe(
                from,
                input.as_deref(),
                records.as_deref().zip(ground_truth.as_deref()),
                &output,
                model.as_deref(),
                frames.as_ref(),
                &config,
            )?;
        }
        Commands::Predict {
            with,
            input,
            ground_truth,
            output,
            model,
            source,
            description_source,
        } => {
            run_predict(
                with,
                &input,
                &ground_truth,
                &output,
                model.as_deref(),
                (&source, &description_source),
                &config,
            )?;
        }
        Commands::Score {
            records,
            ground_truth,
            descriptions,
            predictions,
            output_dir,
        } => {
            let inputs = PipelineInputs {
                records,
                ground_truth,
                descriptions,
                predictions,
            };
            run_score(&inputs, &output_dirs(&config, output_dir), &config)?;
        }
        Commands::Stats { scores, output_dir } => {
            run_stats(&scores, &output_dirs(&config, output_dir), &config)?;
        }
        Commands::Run {
            records,
            ground_truth,
            descriptions,
            predictions,
            output_dir,
        } => {
            let inputs = PipelineInputs {
                records,
                ground_truth,
                descriptions,
                predictions,
            };
            run_all(&inputs, &output_dirs(&config, output_dir), &config)?;
        }
        Commands::Init { force } => {
            run_init(force, &config_path, &config)?;
        }
        Commands::Config { action } => {
            run_config(action, &config_path, &config)?;
        }
    }

    Ok(())
}

/// `--output-dir` root, or the configured directories
fn output_dirs(config: &Config, output_dir: Option<PathBuf>) -> OutputDirs {
    match output_dir {
        Some(root) => OutputDirs::under(&root),
        None => config.output_dirs(),
    }
}

fn print_summary(summary: &RunSummary) {
    summary.log("cli");
    println!("\n{}", summary);
}

fn run_load(records: &Path, ground_truth: &Path, config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::offline(config)?;
    let mut summary = RunSummary::new();
    let loaded = pipeline.load(records, ground_truth, &mut summary)?;
    let vocabulary = pipeline.vocabulary(&loaded)?;

    let participants: std::collections::BTreeSet<&str> =
        loaded.iter().map(|r| r.participant_id.as_str()).collect();
    let mut modalities: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for record in &loaded {
        *modalities.entry(record.modality.as_str()).or_default() += 1;
    }

    println!("Gesture records: {}", loaded.len());
    println!("Participants:    {}", participants.len());
    println!("Commands:        {}", vocabulary.len());
    for (modality, count) in &modalities {
        println!("  {:<24} {}", modality, count);
    }
    print_summary(&summary);
    Ok(())
}

fn run_describe(
    from: DescribeFrom,
    input: Option<&Path>,
    records: Option<(&Path, &Path)>,
    output: &Path,
    model: Option<&str>,
    frames: Option<&FrameSource>,
    config: &Config,
) -> anyhow::Result<()> {
    let mut summary = RunSummary::new();
    let descriptions = match from {
        DescribeFrom::HumanStructured | DescribeFrom::HumanUnstructured => {
            let input = input.context("--input is required for human descriptions")?;
            let pipeline = Pipeline::offline(config)?;
            if from == DescribeFrom::HumanStructured {
                pipeline.describe_structured(input, &mut summary)?
            } else {
                pipeline.describe_unstructured(input, &mut summary)?
            }
        }
        DescribeFrom::Model => {
            let (records, ground_truth) =
                records.context("--records and --ground-truth are required for model descriptions")?;
            let pipeline = Pipeline::from_config(config, model)?;
            let loaded = pipeline.load(records, ground_truth, &mut summary)?;
            if let Some(frames) = frames {
                info!(root = %frames.root.display(), stage = %frames.stage, "Describing from hand-pose frames");
            }
            pipeline.describe_model(&loaded, frames, &mut summary)?
        }
    };

    tables::write_descriptions(output, &descriptions)?;
    println!("Wrote {} descriptions to {}", descriptions.len(), output.display());
    print_summary(&summary);
    Ok(())
}

fn run_predict(
    with: PredictWith,
    input: &Path,
    ground_truth: &Path,
    output: &Path,
    model: Option<&str>,
    (source, description_source): (&str, &str),
    config: &Config,
) -> anyhow::Result<()> {
    let mut summary = RunSummary::new();
    let predictions = match with {
        PredictWith::Human => {
            let pipeline = Pipeline::offline(config)?;
            let vocabulary = pipeline.ground_truth_vocabulary(ground_truth, &mut summary)?;
            let source: PredictorSource = source.parse()?;
            let description_source: DescriptionSource = description_source.parse()?;
            pipeline.predict_human(input, source, description_source, &vocabulary, &mut summary)?
        }
        PredictWith::Model => {
            let pipeline = Pipeline::from_config(config, model)?;
            let vocabulary = pipeline.ground_truth_vocabulary(ground_truth, &mut summary)?;
            let descriptions = tables::read_descriptions(input, &mut summary)?;
            pipeline.predict_model(&descriptions, &vocabulary, &mut summary)?
        }
    };

    tables::write_predictions(output, &predictions)?;
    let unrecognized = predictions
        .iter()
        .filter(|p| !p.predicted_command.is_recognized())
        .count();
    println!(
        "Wrote {} predictions ({} unrecognized) to {}",
        predictions.len(),
        unrecognized,
        output.display()
    );
    print_summary(&summary);
    Ok(())
}

fn run_score(inputs: &PipelineInputs, dirs: &OutputDirs, config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::offline(config)?;
    let mut summary = RunSummary::new();
    let loaded = pipeline.load(&inputs.records, &inputs.ground_truth, &mut summary)?;

    let mut descriptions = Vec::new();
    for path in &inputs.descriptions {
        descriptions.extend(tables::read_descriptions(path, &mut summary)?);
    }
    let mut predictions = Vec::new();
    for path in &inputs.predictions {
        predictions.extend(tables::read_predictions(path, &mut summary)?);
    }

    // Schema problems of the ground-truth table were tallied by `load`
    let vocabulary = pipeline.ground_truth_vocabulary(&inputs.ground_truth, &mut RunSummary::new())?;
    let scores = pipeline.score(&loaded, &descriptions, &predictions, &vocabulary, &mut summary);
    report::write_score_tables(dirs, &scores.report.rows, &scores.aggregates, &scores.similarity_matrix)?;

    println!("Scored {} predictions", scores.report.rows.len());
    for stat in scores
        .aggregates
        .iter()
        .filter(|s| s.metric_name == METRIC_ACCURACY && !s.grouping_key.contains('|'))
    {
        println!("  {:<32} accuracy = {:.3}", stat.grouping_key, stat.value);
    }
    println!("Tables written to {}", dirs.outputs.display());
    print_summary(&summary);
    Ok(())
}

fn run_stats(scores: &Path, dirs: &OutputDirs, config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::offline(config)?;
    let mut summary = RunSummary::new();
    let rows = tables::read_scores(scores, &mut summary)?;
    let tests = pipeline.stats(&rows);
    report::write_statistics(dirs, &tests)?;

    println!("{}", render_statistics(&tests));
    println!("Report written to {}", dirs.statistics_text().display());
    print_summary(&summary);
    Ok(())
}

fn run_all(inputs: &PipelineInputs, dirs: &OutputDirs, config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::offline(config)?;
    let outcome = pipeline.run(inputs, dirs)?;

    println!("{}", render_statistics(&outcome.tests));
    println!(
        "Scored {} predictions over {} gesture records",
        outcome.scores.report.rows.len(),
        outcome.records
    );
    println!("Tables written to {}", dirs.outputs.display());
    println!("Figures written to {}", dirs.figures.display());
    println!("\n{}", outcome.summary);
    Ok(())
}

fn run_init(force: bool, config_path: &Path, config: &Config) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {:?}. Use --force to overwrite.",
            config_path
        );
    }

    config.save(config_path)?;
    println!("Created config at {:?}", config_path);
    println!("\nConfig content:\n{}", config.to_toml()?);

    if config.cache.enabled {
        std::fs::create_dir_all(&config.cache.dir)?;
        println!("Cache directory: {:?}", config.cache.dir);
    }
    Ok(())
}

fn run_config(action: ConfigAction, config_path: &Path, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Configuration ({:?}):\n", config_path);
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Get { key } => match config.get(&key)? {
            Some(value) => println!("{} = {}", key, value),
            None => anyhow::bail!("Configuration key '{}' not found", key),
        },
        ConfigAction::Reset { force } => {
            if config_path.exists() && !force {
                println!("Config exists at {:?}", config_path);
                println!("Use --force to reset to defaults");
                return Ok(());
            }
            Config::default().save(config_path)?;
            println!("Configuration reset to defaults at {:?}", config_path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dirs_prefers_flag() {
        let config = Config::default();
        let dirs = output_dirs(&config, Some(PathBuf::from("study")));
        assert_eq!(dirs.outputs, PathBuf::from("study/outputs"));
        assert_eq!(output_dirs(&config, None), config.output_dirs());
    }
}
