use std::{fs::File, io::BufReader, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nodestats::{
    config::{ChartSource, Charts},
    page::write_rendered,
    store, web,
};

#[derive(Parser)]
#[command(name = "nodestats")]
#[command(about = "Node statistics -> JSON series -> SVG charts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct ChartArgs {
    /// Directory holding the chart data files
    #[arg(long, env = "NODESTATS_MEDIA_DIR", default_value = "static/media")]
    media_dir: PathBuf,

    /// Extra or replacement chart, as id=file
    #[arg(long = "chart", value_name = "ID=FILE")]
    charts: Vec<ChartSource>,
}

impl ChartArgs {
    fn into_charts(self) -> Charts {
        Charts::new(self.media_dir, self.charts)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write each chart as SVG plus an index.html
    Render {
        #[command(flatten)]
        charts: ChartArgs,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },

    /// Run a local chart server
    Serve {
        #[command(flatten)]
        charts: ChartArgs,

        /// Bind address
        #[arg(long, env = "NODESTATS_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Import node snapshots (JSON lines) into DuckDB
    Import {
        /// Path to snapshot file
        snapshots: PathBuf,

        /// DuckDB database file
        #[arg(long, env = "NODESTATS_DB", default_value = "nodestats.duckdb")]
        db: String,
    },

    /// Write the chart data files from stored snapshots
    Export {
        #[command(flatten)]
        charts: ChartArgs,

        /// DuckDB database file
        #[arg(long, env = "NODESTATS_DB", default_value = "nodestats.duckdb")]
        db: String,

        /// Only the last N hours before the newest snapshot
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        hours: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "nodestats=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Render { charts, out } => {
            let written = write_rendered(&charts.into_charts(), &out)?;
            tracing::info!(charts = written, out = %out.display(), "render complete");
        }

        Command::Serve { charts, bind } => {
            let bind: SocketAddr = bind.parse().context("parse bind addr")?;
            web::serve(charts.into_charts(), bind).await?;
        }

        Command::Import { snapshots, db } => {
            let mut conn = store::open_db(&db)?;
            store::init_schema(&conn)?;

            let f = File::open(&snapshots)
                .with_context(|| format!("open {}", snapshots.display()))?;
            let (ok, bad) = store::import_snapshots(&mut conn, BufReader::new(f))?;
            tracing::info!(ok, bad, "import complete");
        }

        Command::Export { charts, db, hours } => {
            let conn = store::open_db(&db)?;
            store::init_schema(&conn)?;
            let written = store::export(&conn, &charts.into_charts(), hours)?;
            tracing::info!(written, "export complete");
        }
    }

    Ok(())
}
