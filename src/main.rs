//! beagle CLI: build forensic graphs from event logs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use beagle_graph::config::BeagleConfig;
use beagle_graph::event::{DataSource, JsonLinesSource};
use beagle_graph::export::GraphDocument;
use beagle_graph::graph::{FieldPolicy, GraphAccumulator, MalformedPolicy};
use beagle_graph::pipeline::Pipeline;
use beagle_graph::transform::{TRANSFORMERS, transformer_by_name};
use beagle_graph::value::{Value, record};

#[derive(Parser)]
#[command(name = "beagle", version, about = "Forensic graph-construction engine")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph from a JSON-lines event file.
    Graph {
        /// Event file, one JSON object per line.
        #[arg(long)]
        input: PathBuf,

        /// Transformer that maps events to nodes.
        #[arg(long, default_value = "generic")]
        transformer: String,

        /// Write the graph document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Emit one link per (source, target, kind) with all occurrences.
        #[arg(long)]
        consolidate_edges: bool,

        /// Reject an event's whole batch when any of its nodes is malformed,
        /// instead of skipping only the malformed nodes.
        #[arg(long)]
        abort_on_malformed: bool,

        /// Let later observations overwrite attribute values.
        #[arg(long)]
        last_writer_wins: bool,

        /// Transform events on the calling thread only.
        #[arg(long)]
        sequential: bool,
    },

    /// Merge previously exported graph documents into one.
    Merge {
        /// Graph documents written by `beagle graph`.
        #[arg(required = true)]
        documents: Vec<PathBuf>,

        /// Write the merged document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Emit one link per (source, target, kind) with all occurrences.
        #[arg(long)]
        consolidate_edges: bool,
    },

    /// Show node and edge counts of a graph document.
    Stats {
        /// Graph document written by `beagle graph`.
        document: PathBuf,
    },

    /// List the registered node variants and their identity fields.
    Variants,

    /// Inspect or create configuration files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write a default configuration file.
    Init {
        /// Destination path.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BeagleConfig::load(path)?,
        None => BeagleConfig::default(),
    };
    // Malformed variant declarations are fatal before any event is read.
    let catalog = config.catalog()?;

    match cli.command {
        Commands::Graph {
            input,
            transformer,
            output,
            consolidate_edges,
            abort_on_malformed,
            last_writer_wins,
            sequential,
        } => {
            if consolidate_edges {
                config.export.consolidate_edges = true;
            }
            if abort_on_malformed {
                config.accumulator.on_malformed = MalformedPolicy::Abort;
            }
            if last_writer_wins {
                config.accumulator.field_policy = FieldPolicy::LastWriterWins;
            }
            if sequential {
                config.pipeline.parallel = false;
            }

            let transformer = transformer_by_name(&transformer, &catalog)?;
            let mut source = JsonLinesSource::open(&input)?;
            let mut graph = GraphAccumulator::with_config(config.accumulator);
            let summary =
                Pipeline::new(transformer.as_ref(), config.pipeline).run(&mut source, &mut graph);
            eprintln!("{summary}");

            let mut metadata = source.metadata();
            metadata.insert("transformer".into(), Value::from(transformer.name()));
            let document = GraphDocument::from_graph(&graph, metadata, config.export);
            write_document(&document, output.as_deref())?;
        }

        Commands::Merge {
            documents,
            output,
            consolidate_edges,
        } => {
            if consolidate_edges {
                config.export.consolidate_edges = true;
            }
            let mut graph = GraphAccumulator::with_config(config.accumulator);
            for path in &documents {
                let document = read_document(path)?;
                let report = graph.ingest(document.into_batch(&catalog)?)?;
                tracing::info!(
                    document = %path.display(),
                    inserted = report.inserted,
                    merged = report.merged,
                    skipped = report.skipped.len(),
                    "merged document"
                );
            }
            let metadata = record([("merged_documents", documents.len() as i64)]);
            let document = GraphDocument::from_graph(&graph, metadata, config.export);
            write_document(&document, output.as_deref())?;
        }

        Commands::Stats { document } => {
            let mut graph = GraphAccumulator::new();
            graph.ingest(read_document(&document)?.into_batch(&catalog)?)?;
            print!("{}", graph.stats());
        }

        Commands::Variants => {
            println!("Variants ({}):", catalog.len());
            for variant in catalog.all() {
                let fields: Vec<String> = variant
                    .identity_fields()
                    .iter()
                    .map(|f| {
                        if f.required {
                            format!("{}*", f.name)
                        } else {
                            f.name.clone()
                        }
                    })
                    .collect();
                println!(
                    "  {:<12} identity: {:<40} display: {}",
                    variant.name(),
                    fields.join(", "),
                    variant.display_field()
                );
            }
            println!("\nTransformers: {}", TRANSFORMERS.join(", "));
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml_string()?);
            }
            ConfigAction::Init { path } => {
                if path.exists() {
                    miette::bail!("{} already exists", path.display());
                }
                BeagleConfig::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        },
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<GraphDocument> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    Ok(GraphDocument::from_json_str(&content)?)
}

fn write_document(document: &GraphDocument, output: Option<&Path>) -> Result<()> {
    let json = document.to_json_string()?;
    match output {
        Some(path) => {
            std::fs::write(path, json).into_diagnostic()?;
            tracing::info!(
                path = %path.display(),
                nodes = document.nodes.len(),
                links = document.links.len(),
                "wrote graph document"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
