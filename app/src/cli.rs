//! Command-line front end for classification jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;

use verbatim_core::{
    build_gateway, default_categories, detect_verbatim_column, Category, ClassificationReport,
    ClassifiedRow, Config, JobCoordinator, JobHandle, JobStatus, MemoryStore, Settings, Table,
};

#[derive(Parser, Debug)]
#[command(name = "verbatim")]
#[command(about = "Classify free-text survey comments into categories")]
pub struct Args {
    /// Settings file (defaults to the data directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify the comments of a JSON table
    Classify {
        /// JSON array of row objects
        #[arg(long)]
        input: PathBuf,
        /// Verbatim column; detected when omitted
        #[arg(long)]
        column: Option<String>,
        /// JSON array of {"title", "description"}; defaults to the built-in list
        #[arg(long)]
        categories: Option<PathBuf>,
        /// Output file, `-` for stdout; defaults to the results directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the column most likely to hold comments
    DetectColumn {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the effective settings
    Settings {
        /// Also write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

/// Output document of `classify`
#[derive(Debug, Serialize)]
pub struct ClassifyOutput {
    pub job: String,
    pub rows: Vec<ClassifiedRow>,
    pub report: ClassificationReport,
}

pub async fn run(args: Args) -> Result<()> {
    let config = Config::load_or_default();
    config
        .ensure_dirs()
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
    let settings_file = args.settings.unwrap_or_else(|| config.settings_file.clone());
    let settings = Settings::load(&settings_file).with_env_overrides();
    settings.validate().context("Invalid settings")?;

    match args.command {
        Command::Classify {
            input,
            column,
            categories,
            output,
        } => {
            let table = load_table(&input)?;
            let categories = match categories {
                Some(path) => load_categories(&path)?,
                None => default_categories(),
            };
            let result = classify(&settings, table, column, categories).await?;
            let output = output_path(&config, output, &result.job);
            write_json(output.as_deref(), &result)
        }
        Command::DetectColumn { input } => {
            let table = load_table(&input)?;
            let (column, confident) =
                detect_verbatim_column(&table).context("Table has no columns")?;
            println!("{column}");
            if !confident {
                tracing::info!(column = %column, "Column picked heuristically");
            }
            Ok(())
        }
        Command::Settings { save } => {
            if save {
                settings.save(&settings_file)?;
                tracing::info!(path = %settings_file.display(), "Saved settings");
            }
            write_json(None, &settings)
        }
    }
}

/// Where `classify` writes its output; `None` means stdout.
fn output_path(config: &Config, output: Option<PathBuf>, job: &str) -> Option<PathBuf> {
    match output {
        Some(path) if path.as_os_str() == "-" => None,
        Some(path) => Some(path),
        None => Some(config.results_dir.join(format!("{job}.json"))),
    }
}

/// Run one classification job to completion, logging its progress.
pub async fn classify(
    settings: &Settings,
    table: Table,
    column: Option<String>,
    categories: Vec<Category>,
) -> Result<ClassifyOutput> {
    let column = match column {
        Some(column) => column,
        None => {
            let (column, confident) =
                detect_verbatim_column(&table).context("Table has no columns")?;
            tracing::info!(column = %column, confident, "Detected verbatim column");
            column
        }
    };

    let gateway = build_gateway(settings)?;
    let coordinator = JobCoordinator::new(gateway, Arc::new(MemoryStore::new()), settings);
    let handle = coordinator
        .start(JobHandle::new(), table, &column, categories)
        .await?;

    let mut progress = Box::pin(coordinator.stream_progress(&handle));
    let mut last_processed = None;
    while let Some(record) = progress.next().await {
        if last_processed != Some(record.processed) || record.is_terminal() {
            tracing::info!(
                status = %record.status,
                progress = record.progress,
                processed = record.processed,
                total = record.total,
                eta_seconds = record.eta_seconds,
                "{}",
                record.current_step
            );
            last_processed = Some(record.processed);
        }
    }

    let record = coordinator.wait(&handle).await?;
    if record.status != JobStatus::Completed {
        anyhow::bail!(
            "Classification failed: {}",
            record.error.unwrap_or_else(|| record.current_step.clone())
        );
    }

    Ok(ClassifyOutput {
        job: handle.to_string(),
        rows: coordinator.get_result(&handle).await?,
        report: coordinator.summary(&handle).await?,
    })
}

/// Read a JSON array of row objects.
pub fn load_table(path: &Path) -> Result<Table> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of objects", path.display()))?;
    Ok(Table::from_records(records))
}

/// Read a JSON array of categories.
pub fn load_categories(path: &Path) -> Result<Vec<Category>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of categories", path.display()))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote classification output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verbatim_core::ProviderConfig;

    fn keyword_settings() -> Settings {
        Settings {
            provider: ProviderConfig::Keyword,
            progress_poll_ms: 10,
            ..Settings::default()
        }
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_table_and_categories() {
        let dir = TempDir::new().unwrap();
        let input = write(
            &dir,
            "rows.json",
            r#"[{"id": 1, "Feedback": "Long queue"}, {"id": 2, "Feedback": ""}]"#,
        );
        let table = load_table(&input).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["id", "Feedback"]);

        let categories = write(&dir, "cats.json", r#"[{"title": "Queues"}]"#);
        let categories = load_categories(&categories).unwrap();
        assert_eq!(categories[0].title, "Queues");
        assert_eq!(categories[0].description, "");

        let bad = write(&dir, "bad.json", r#"{"not": "an array"}"#);
        assert!(load_table(&bad).is_err());
    }

    #[tokio::test]
    async fn test_classify_with_keywords() {
        let dir = TempDir::new().unwrap();
        let input = write(
            &dir,
            "rows.json",
            r#"[
                {"id": 1, "Feedback": "The queue was long and the delay annoying"},
                {"id": 2, "Feedback": "   "},
                {"id": 3, "Feedback": "Excellent, thank you so much"}
            ]"#,
        );
        let table = load_table(&input).unwrap();

        let output = classify(&keyword_settings(), table, None, default_categories())
            .await
            .unwrap();

        let assigned: Vec<&str> = output.rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(assigned, vec!["Wait Times", "No Comment", "Positive Feedback"]);
        assert_eq!(output.report.verbatim_column, "Feedback");
        assert_eq!(output.report.total_with_comments, 2);
    }

    #[tokio::test]
    async fn test_classify_rejects_unknown_column() {
        let table = Table::from_records(vec![]);
        let result = classify(
            &keyword_settings(),
            table,
            Some("missing".to_string()),
            default_categories(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_output_path() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(dir.path().to_path_buf());
        config.ensure_dirs().unwrap();
        assert!(config.results_dir.is_dir());

        assert_eq!(
            output_path(&config, None, "job-1"),
            Some(config.results_dir.join("job-1.json"))
        );
        assert_eq!(output_path(&config, Some(PathBuf::from("-")), "job-1"), None);
        assert_eq!(
            output_path(&config, Some(PathBuf::from("out.json")), "job-1"),
            Some(PathBuf::from("out.json"))
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "verbatim",
            "classify",
            "--input",
            "rows.json",
            "--column",
            "Comments",
        ])
        .unwrap();
        match args.command {
            Command::Classify { input, column, .. } => {
                assert_eq!(input, PathBuf::from("rows.json"));
                assert_eq!(column.as_deref(), Some("Comments"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
