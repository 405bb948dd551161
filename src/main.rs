use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use dotenvy::dotenv;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

mod config;
mod error;
mod export;
mod gallery;
mod llm;
mod plan;
mod utils;

use config::Config;
use export::export_gallery;
use gallery::Gallery;
use llm::{GeminiHttpClient, GenerateContent, SketchDispatcher};
use plan::{PlanGenerator, UserInput};
use utils::logging::init_logging;

fn usage() -> &'static str {
    "Usage: shooting_plan_guide [--input <brief.json>] [--no-sketches]\nReads the brief from stdin when --input is omitted and prints the gallery JSON to stdout."
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    input: Option<PathBuf>,
    sketches: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut parsed = CliArgs {
        input: None,
        sketches: true,
    };
    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--input" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --input"))?;
                parsed.input = Some(PathBuf::from(value));
            }
            "--no-sketches" => {
                parsed.sketches = false;
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }
    Ok(parsed)
}

async fn read_brief(path: Option<&PathBuf>) -> Result<UserInput> {
    let text = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read brief from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("brief is not a valid JSON document")
}

/// Waits for every sketch task, or tears the gallery down on Ctrl-C.
async fn await_sketches(gallery: &Gallery, handles: Vec<tokio::task::JoinHandle<()>>) {
    tokio::select! {
        _ = join_sketch_tasks(handles) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; cancelling pending sketches");
            gallery.teardown();
        }
    }
}

async fn join_sketch_tasks(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            error!("Sketch task failed: {err}");
        }
    }
}

async fn run(config: Config, cli: CliArgs) -> Result<bool> {
    let config = Arc::new(config);
    let transport: Arc<dyn GenerateContent> = Arc::new(GeminiHttpClient::new(&config)?);
    let generator = Arc::new(PlanGenerator::new(config.clone(), transport.clone()));
    let gallery = Gallery::new(generator);

    let brief = read_brief(cli.input.as_ref()).await?;
    info!(
        portrait = brief.portrait_count,
        landscape = brief.landscape_count,
        "Generating shooting plans"
    );

    let generated = match gallery.generate(brief).await {
        Ok(count) => {
            info!("Received {count} plan(s)");
            true
        }
        Err(err) => {
            error!(kind = err.kind(), "Plan generation failed: {err}");
            false
        }
    };

    if generated && cli.sketches {
        let dispatcher = Arc::new(SketchDispatcher::new(config.clone(), transport));
        let handles = gallery.spawn_sketches(dispatcher);
        await_sketches(&gallery, handles).await;
    }

    let snapshot = gallery.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(dir) = config.export_dir.as_deref() {
        match export_gallery(&snapshot, dir, Local::now().date_naive()) {
            Ok(summary) => info!(
                json = %summary.json_path.display(),
                sheet = ?summary.sheet_path,
                sketches = summary.sketches_placed,
                "Exported gallery"
            ),
            Err(err) => error!("Gallery export failed: {err:#}"),
        }
    }

    Ok(generated)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    let _guards = init_logging(&config);
    for message in &config.warnings {
        warn!("{message}");
    }
    info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        backend = config.text_backend.as_str(),
        "Starting shooting plan guide"
    );

    match run(config, cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
