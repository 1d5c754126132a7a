use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use photobook_lib::cli::{run_user_op, UserOp};
use photobook_lib::config::{Config, DEFAULT_CONFIG_FILE};
use photobook_lib::logging::init_logging;
use photobook_lib::server::{self, AppState};
use photobook_lib::services::db::Database;
use photobook_lib::services::layout::StorageLayout;

/// Serve a folder tree of photos and videos with thumbnails and zip downloads
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to listen on, overrides `listen_addr`
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log level (error, warn, info, debug, trace), overrides `log_level`
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Manage user accounts and private folder grants
    User {
        #[command(subcommand)]
        op: UserOp,
    },
}

fn main() {
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    let level = match config.tracing_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let _guards = init_logging(level, config.log_dir.as_deref());

    if let Some(Command::User { op }) = args.command {
        manage_users(op, &config);
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.workers)
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async move {
        let state = AppState::from_config(config)?;
        server::run(state).await
    });

    if let Err(e) = result {
        tracing::error!(error = %e, "server exited with error");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn manage_users(op: UserOp, config: &Config) {
    let layout = match StorageLayout::from_config(config) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("Error: failed to prepare storage roots: {}", e);
            std::process::exit(1);
        }
    };
    let db = match Database::new(&config.database) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    match run_user_op(op, &db, &layout) {
        Ok(report) => println!("{}", report),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
