mod commands;

use clap::{Parser, Subcommand};
use commands::{batch, cache_key, cleanup, install, run, version};
use dfcli_orchestrator::{log_debug, log_error, logger};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dfcli-orchestrator")]
#[command(about = "Provision, configure and run dfcli from build jobs", long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to the orchestrator configuration file
    #[arg(long, global = true, env = "DFCLI_ORCHESTRATOR_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Download and install the dfcli binary
    Install {
        /// dfcli version to install; latest when omitted
        #[arg(long)]
        version: Option<String>,
        /// Installation directory
        #[arg(long)]
        dir: Option<String>,
    },
    /// Run a single dfcli command
    Run {
        /// The dfcli command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
        /// Version used to build the cache key
        #[arg(long)]
        version: Option<String>,
        /// Cache key property, KEY=VALUE (repeatable)
        #[arg(long = "property")]
        properties: Vec<String>,
        /// Explicit cache key
        #[arg(long)]
        cache_key: Option<String>,
        /// Attempts before giving up
        #[arg(long)]
        retries: Option<u32>,
        /// Workspace directory; defaults to the current directory
        #[arg(long)]
        workspace: Option<String>,
        /// Run identifier; defaults to BUILD_NUMBER or a random id
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run the tasks of a batch file concurrently
    Batch {
        /// YAML file with the tasks
        tasks: String,
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Print the cache key for a version and properties
    CacheKey {
        #[arg(long)]
        version: Option<String>,
        #[arg(long = "property")]
        properties: Vec<String>,
    },
    /// Delete the dfcli home directory of a run
    Cleanup {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        workspace: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.debug);
    let config = cli.config.as_deref();

    let outcome = match cli.command {
        Commands::Version => {
            version::run(commands::load(config).ok().as_ref());
            Ok(())
        }
        Commands::Install { version, dir } => install::run(config, version, dir),
        Commands::Run {
            command,
            version,
            properties,
            cache_key,
            retries,
            workspace,
            run_id,
        } => run::run(
            config,
            run::RunArgs {
                command,
                version,
                properties,
                cache_key,
                retries,
                workspace,
                run_id,
            },
        ),
        Commands::Batch {
            tasks,
            max_concurrency,
            json,
            workspace,
            run_id,
        } => batch::run(config, &tasks, max_concurrency, json, workspace, run_id),
        Commands::CacheKey {
            version,
            properties,
        } => cache_key::run(version, &properties),
        Commands::Cleanup { run_id, workspace } => cleanup::run(run_id, workspace),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error!("{:#}", e);
            let code = e
                .downcast_ref::<dfcli_orchestrator::Error>()
                .and_then(|e| e.tool_exit_code())
                .and_then(|c| u8::try_from(c).ok())
                .filter(|c| *c != 0)
                .unwrap_or(1);
            log_debug!("Exiting with code {}", code);
            ExitCode::from(code)
        }
    }
}
