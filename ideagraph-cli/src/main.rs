// Copyright 2025 Ideagraph Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ideagraph CLI
//!
//! Replays a recorded research stream through the viewer core and prints
//! the resulting graph, or lays out a saved graph document.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ideagraph_core::{
    ConceptExplorer, GraphState, LayoutEngine, SessionOutcome, SessionView, ViewerConfig,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideagraph")]
#[command(about = "Ideagraph - concept evolution graph viewer core", long_about = None)]
struct Cli {
    /// Viewer config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event stream
    Replay {
        /// Stream transcript, or `-` for stdin
        #[arg(default_value = "-")]
        path: String,

        /// Concept the stream was requested for
        #[arg(long, default_value = "")]
        concept: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,

        /// Read size in bytes
        #[arg(long, default_value = "4096")]
        chunk_size: usize,
    },

    /// Lay out a graph document and print node positions
    Layout {
        /// GraphState JSON file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Plain-text digest with counts
    Summary,
    /// Final graph as JSON
    Json,
    /// Layout as JSON
    Positions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_filter = if cli.verbose {
        "ideagraph=debug,ideagraph_core=debug"
    } else {
        "ideagraph=info,ideagraph_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            path,
            concept,
            format,
            chunk_size,
        } => replay(config, &path, concept, format, chunk_size).await,
        Commands::Layout { path } => layout(config, &path),
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => {
            let config = ViewerConfig::load(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            debug!(?config, "loaded config");
            Ok(config)
        }
        None => Ok(ViewerConfig::default()),
    }
}

async fn replay(
    config: ViewerConfig,
    path: &str,
    concept: String,
    format: OutputFormat,
    chunk_size: usize,
) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be greater than zero");
    }

    let input: Box<dyn AsyncRead + Unpin + Send> = if path == "-" {
        Box::new(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path))?;
        Box::new(file)
    };
    let chunks = ReaderStream::with_capacity(input, chunk_size);

    let mut explorer = ConceptExplorer::new(config);
    let mut views = explorer.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last = String::new();
        while views.changed().await.is_ok() {
            let status = views.borrow_and_update().status.clone();
            if status != last {
                info!(%status, "status");
                last = status;
            }
        }
    });

    let session = explorer.begin(concept);
    let session_id = session.id();
    let outcome = session.run(chunks).await;

    let view = explorer.current();
    drop(explorer);
    let _ = watcher.await;

    print_view(&view, format)?;

    match outcome {
        SessionOutcome::Completed => {
            info!(%session_id, "replay complete");
            Ok(())
        }
        SessionOutcome::Ended => {
            warn!(%session_id, "stream ended before the session completed");
            Ok(())
        }
        SessionOutcome::Failed(message) => bail!("session failed: {}", message),
        SessionOutcome::Cancelled => bail!("session cancelled"),
    }
}

fn print_view(view: &SessionView, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            let stats = view.graph.stats();
            print!("{}", view.graph.summary());
            println!();
            println!("Status: {}", view.status);
            println!(
                "Nodes: {}  Edges: {}  Layers: {}  Skipped lines: {}",
                stats.node_count,
                stats.edge_count,
                view.layout.rank_count(),
                view.decode_faults
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(view.graph.as_ref())?);
        }
        OutputFormat::Positions => {
            println!("{}", serde_json::to_string_pretty(view.layout.as_ref())?);
        }
    }
    Ok(())
}

fn layout(config: ViewerConfig, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    let graph = GraphState::from_json(&raw)
        .with_context(|| format!("Invalid graph document {:?}", path))?;

    let positioned = LayoutEngine::new(config.layout).layout(&graph);
    info!(
        nodes = positioned.nodes.len(),
        layers = positioned.rank_count(),
        cycle_edges = positioned.cycle_edges.len(),
        "laid out graph"
    );
    println!("{}", serde_json::to_string_pretty(&positioned)?);
    Ok(())
}
