/*!
shaper Command Line Interface

Renders dashboard scripts to JSON documents and exports download results,
against a DuckDB database.
*/

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use shaper::api::validate;
use shaper::binder::QueryParams;
use shaper::download::DownloadFormat;
use shaper::{BuildRequest, DashboardSource, Engine, EngineConfig, VERSION};

#[derive(Parser)]
#[command(name = "shaper")]
#[command(about = "Turns SQL dashboard scripts into render-ready documents")]
#[command(version = VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that execute a script
#[derive(clap::Args)]
pub struct Connection {
    /// Data source connection string
    #[arg(long, default_value = "duckdb://memory")]
    reader: String,

    /// SQL file run once before the dashboard (tables, attachments)
    #[arg(long)]
    setup: Option<PathBuf>,

    /// Filter selections as a query string, e.g. `region=EU&from=2024-01-01`
    #[arg(long, default_value = "")]
    params: String,

    /// Rows kept per rendered statement
    #[arg(long, default_value_t = shaper::config::DEFAULT_MAX_ROWS)]
    max_rows: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the dashboard document of a script
    Render {
        /// Path to the .sql dashboard script
        file: PathBuf,

        #[command(flatten)]
        connection: Connection,

        /// Output file path (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Export the result of one statement as CSV or XLSX
    Download {
        /// Path to the .sql dashboard script
        file: PathBuf,

        /// 0-based index of the statement to export
        statement: usize,

        /// csv or xlsx
        #[arg(long, default_value = "csv")]
        format: String,

        #[command(flatten)]
        connection: Connection,

        /// Output file path (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Split a script and report its statements without executing it
    Validate {
        /// Path to the .sql dashboard script
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            file,
            connection,
            output,
            pretty,
        } => cmd_render(&file, &connection, output.as_deref(), pretty),
        Commands::Download {
            file,
            statement,
            format,
            connection,
            output,
        } => cmd_download(&file, statement, &format, &connection, output.as_deref()),
        Commands::Validate { file } => cmd_validate(&file),
    }
}

fn read_source(file: &Path) -> anyhow::Result<DashboardSource> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let id = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dashboard".to_string());
    Ok(DashboardSource::new(id.clone(), id, content))
}

fn open_engine(connection: &Connection) -> anyhow::Result<(Engine, BuildRequest)> {
    let config = EngineConfig {
        reader: connection.reader.clone(),
        max_rows: connection.max_rows,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).context("Failed to open database")?;

    if let Some(setup) = &connection.setup {
        let sql = fs::read_to_string(setup)
            .with_context(|| format!("Failed to read {}", setup.display()))?;
        engine.setup(&sql).context("Setup SQL failed")?;
    }

    let request =
        BuildRequest::new().with_params(QueryParams::from_query_string(&connection.params));
    Ok((engine, request))
}

fn open_output(output: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    })
}

fn cmd_render(
    file: &Path,
    connection: &Connection,
    output: Option<&Path>,
    pretty: bool,
) -> anyhow::Result<()> {
    let source = read_source(file)?;
    let (engine, request) = open_engine(connection)?;

    let document = engine.get_dashboard(&source, &request)?;
    let json = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };

    let mut out = open_output(output)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

fn cmd_download(
    file: &Path,
    statement: usize,
    format: &str,
    connection: &Connection,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let format: DownloadFormat = format.parse()?;
    if format == DownloadFormat::Xlsx && output.is_none() {
        bail!("XLSX output needs --output");
    }

    let source = read_source(file)?;
    let (engine, request) = open_engine(connection)?;

    let mut out = open_output(output)?;
    let rows = engine.download(&source, statement, format, &request, &mut out)?;
    out.flush()?;
    tracing::info!(rows, "Export written");
    Ok(())
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let source = read_source(file)?;
    let validated = validate(&source.content);

    if let Some(error) = validated.errors.first() {
        bail!("{}", error.message);
    }
    println!("{} statements", validated.statements);
    if !validated.side_effects.is_empty() {
        println!("Side effects: {:?}", validated.side_effects);
    }
    Ok(())
}
