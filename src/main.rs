use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use lumi_inspector::dom::{Document, NodeId, Page};
use lumi_inspector::locator::{parse_node, PlaceholderCapture, StrategyBuilder};
use lumi_inspector::recorder::{self, RecordedBatch, Recorder, RecorderState, UiOverlay};
use lumi_inspector::utils::InspectorConfig;

#[derive(Parser)]
#[command(name = "lumi-inspector")]
#[command(author = "NL Team")]
#[command(version = "0.1.3")]
#[command(about = "Element locator strategies and interaction recorder", long_about = None)]
struct Cli {
    /// Inspector configuration (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// CSS selector of the element
    #[arg(long, conflicts_with = "xpath", required_unless_present = "xpath")]
    css: Option<String>,

    /// XPath expression of the element
    #[arg(long)]
    xpath: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a full locator (ranked selectors + screenshot) for one element
    Locate {
        /// Page markup file
        file: PathBuf,

        #[command(flatten)]
        target: Target,

        /// Page URL reported in the locator (defaults to the file URL)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the compact recorder description of one element
    Scan {
        /// Page markup file
        file: PathBuf,

        #[command(flatten)]
        target: Target,
    },

    /// Replay an event script through the recorder and print every batch
    Record {
        /// Page markup file
        file: PathBuf,

        /// Event script (YAML)
        script: PathBuf,

        /// Page URL reported in batches (defaults to the file URL)
        #[arg(long)]
        url: Option<String>,
    },
}

fn load_page(file: &Path, url: Option<String>) -> anyhow::Result<Page> {
    let markup = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let url = url.unwrap_or_else(|| format!("file://{}", file.display()));
    Ok(Page::from_markup(&url, &markup)?)
}

fn find_target(doc: &Document, target: &Target) -> anyhow::Result<NodeId> {
    let found = match (&target.css, &target.xpath) {
        (Some(css), _) => doc.query_selector(css)?,
        (None, Some(xpath)) => doc.evaluate_xpath(xpath)?.into_iter().next(),
        (None, None) => anyhow::bail!("Either --css or --xpath is required"),
    };
    found.context("No element matches the target")
}

fn print_batch(batch: &RecordedBatch) {
    let count = batch.actions.as_ref().map_or(0, Vec::len);
    println!(
        "{} {} ({} actions)",
        "⏺".red().bold(),
        format!("{:?}", batch.action_type).to_lowercase().cyan(),
        count
    );
    match serde_json::to_string_pretty(batch) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("  {} Failed to serialize batch: {}", "⚠️".yellow(), e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => InspectorConfig::from_yaml_file(path)?,
        None => InspectorConfig::default(),
    };

    match cli.command {
        Commands::Locate { file, target, url } => {
            let page = load_page(&file, url)?;
            let node = find_target(&page.read(), &target)?;

            println!("{} Locating element in {}", "▶".green().bold(), file.display());
            let builder = StrategyBuilder::new(&config);
            let locator = builder
                .build_locator(&page, node, &PlaceholderCapture)
                .await?;
            for alternative in &locator.alternatives {
                println!(
                    "  {} {}",
                    alternative.candidate.strategy.to_string().cyan(),
                    alternative.candidate.value
                );
            }
            println!("{}", serde_json::to_string_pretty(&locator)?);
        }

        Commands::Scan { file, target } => {
            let page = load_page(&file, None)?;
            let doc = page.read();
            let node = find_target(&doc, &target)?;
            let builder = StrategyBuilder::new(&config);
            let selectors = builder.build_strategies(&doc, node);
            let parsed = parse_node(&doc, node, selectors, &config.attribute_names, None)
                .with_context(|| format!("Element {} cannot be classified", doc.describe(node)))?;
            println!(
                "{} {} {}",
                "✓".green().bold(),
                parsed.classified.kind.to_string().cyan(),
                parsed.path
            );
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }

        Commands::Record { file, script, url } => {
            let page = load_page(&file, url)?;
            let steps = recorder::load_script(&script)?;
            println!(
                "{} Recording {} steps from {}",
                "🔴".to_string().red().bold(),
                steps.len(),
                script.display()
            );

            let overlay = UiOverlay::install(&page)?;
            let (tx, mut rx) = mpsc::unbounded_channel();
            let recorder =
                Recorder::new(page.clone(), overlay.clone(), config).with_redispatch(tx);
            recorder
                .record_event(Arc::new(|batch: RecordedBatch| print_batch(&batch)))
                .await?;

            let delivered = recorder::play(&page, &recorder, &steps, Some(&mut rx)).await?;
            if recorder.state().await == RecorderState::Recording {
                recorder.stop().await?;
            }
            overlay.dispose()?;

            println!(
                "\n{} {} events delivered, {} actions recorded",
                "⏹️ ".yellow(),
                delivered,
                recorder.actions().await.len()
            );
        }
    }

    Ok(())
}
