///
/// gatesql CLI - Query, migrate and serve SQLite databases
///
/// - gatesql app.db "SELECT * FROM users": run once and print a table
/// - gatesql app.db: interactive shell
/// - gatesql -m migrations app.db: apply pending migrations first
/// - gatesql --serve 127.0.0.1:8080 app.db: read-only HTTP endpoint
///

mod errors;
mod output;
mod repl;
mod session;
mod settings;

use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

use gatesql::{Access, Database, Migrations, read_migrations};
use gatesql_http::QueryEndpoint;

use crate::errors::CliError;
use crate::repl::Repl;
use crate::session::{Format, Session};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "gatesql")]
#[command(author, version, about = "Query, migrate and serve SQLite databases", long_about = None)]
struct Cli {
    /// Database file
    db_file: PathBuf,

    /// Statement to run once; without it an interactive shell starts
    query: Vec<String>,

    /// Print the query plan and elapsed time to stderr
    #[arg(short, long)]
    debug: bool,

    /// Print rows as JSON objects instead of a table
    #[arg(long)]
    json: bool,

    /// Apply pending migrations from this directory at open
    #[arg(short, long, value_name = "DIR")]
    migrations: Option<PathBuf>,

    /// Settings file with [database] and [server] tables
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run statements through the read-only handle
    #[arg(long)]
    read_only: bool,

    /// Serve the read-only query endpoint at this address
    #[arg(long, value_name = "ADDR")]
    serve: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.serve.is_some() {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.database.path = cli.db_file.clone();
    if cli.read_only || cli.serve.is_some() {
        settings.database.read_only = true;
    }
    if let Some(dir) = cli.migrations.clone() {
        settings.database.migrations_dir = Some(dir);
    }
    if let Some(bind) = &cli.serve {
        settings.server.bind = bind.clone();
    }

    let migrations = match &settings.database.migrations_dir {
        Some(dir) => read_migrations(dir)?,
        None => Migrations::new(),
    };
    let mut db = Database::new(settings.database.clone());
    db.open(&migrations)?;

    if cli.serve.is_some() {
        return serve(db, settings);
    }

    let access = if cli.read_only { Access::ReadOnly } else { Access::ReadWrite };
    let format = if cli.json { Format::Json } else { Format::Table };
    let session = Session::new(db, access, format, cli.debug);

    if cli.query.is_empty() {
        return Repl::new(session)?.run();
    }
    let sql = cli.query.join(" ");
    session.execute(&sql, &mut std::io::stdout())?;
    session.close()
}

fn serve(mut db: Database, settings: Settings) -> Result<(), CliError> {
    let endpoint = QueryEndpoint::new(&db, settings.server)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(gatesql_http::serve(endpoint, async {
        let _ = tokio::signal::ctrl_c().await;
    }))?;
    db.close()?;
    Ok(())
}
