//! # Command Line Interface
//!
//! `gcredstash` subcommands: key provisioning (`create-keyring`, `create-key`),
//! single credentials (`get`, `put`), batches (`put-all`, `get-all`), `list`,
//! and `config show`.
//!
//! Exit codes: 0 on success (including bare `gcredstash`, which prints help),
//! 1 when an operation fails or a batch is incomplete, 2 for usage errors.

pub mod commands;
pub mod config;
pub mod output;

pub use commands::Dispatcher;
pub use output::OutputFormat;

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use crate::errors::VaultError;
use crate::observability::{init_logging, log_config_info, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "gcredstash")]
#[command(about = "Credential vault backed by Google Cloud KMS and Cloud Datastore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// GCP project id
    #[arg(long, global = true)]
    pub project_id: Option<String>,

    /// Cloud KMS location id [default: global]
    #[arg(long, global = true)]
    pub location_id: Option<String>,

    /// Cloud KMS key ring id
    #[arg(long, global = true)]
    pub keyring_id: Option<String>,

    /// Cloud KMS crypto key id
    #[arg(long, global = true)]
    pub key_id: Option<String>,

    /// Datastore kind holding the credentials [default: Credentials]
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Datastore namespace
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Configuration file [default: ~/.gcredstash/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Create a key ring in the configured location
    #[command(name = "create-keyring")]
    CreateKeyring {
        /// Unique id for the new key ring
        new_keyring_id: String,
    },

    /// Create an encrypt/decrypt key in the configured key ring
    CreateKey {
        /// Unique id for the new key
        new_key_id: String,
    },

    /// Decrypt and print one credential
    Get {
        /// Credential name
        name: String,

        /// Do not print a trailing newline
        #[arg(short = 'n', long)]
        no_newline: bool,
    },

    /// Encrypt and store one credential
    Put {
        /// Credential name
        name: String,

        /// Value to encrypt, or `-` to read it from stdin
        #[arg(allow_hyphen_values = true)]
        plaintext: String,
    },

    /// Store every credential of a JSON object {"NAME": "value", ...}
    PutAll {
        /// JSON file, or `-` for stdin
        file: String,
    },

    /// Decrypt and print every credential in the collection
    #[command(alias = "getAll")]
    GetAll,

    /// List credential names in the collection
    List,

    /// Inspect the resolved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration
    Show,
}

impl Commands {
    /// Command name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Commands::CreateKeyring { .. } => "create-keyring",
            Commands::CreateKey { .. } => "create-key",
            Commands::Get { .. } => "get",
            Commands::Put { .. } => "put",
            Commands::PutAll { .. } => "put-all",
            Commands::GetAll => "get-all",
            Commands::List => "list",
            Commands::Config { .. } => "config",
        }
    }

    /// Command name plus the credential or resource it acts on
    pub fn context(&self) -> String {
        match self {
            Commands::Get { name, .. } | Commands::Put { name, .. } => {
                format!("{} {}", self.name(), name)
            }
            Commands::CreateKeyring { new_keyring_id: id } | Commands::CreateKey { new_key_id: id } => {
                format!("{} {}", self.name(), id)
            }
            _ => self.name().to_string(),
        }
    }
}

/// Run the CLI and map the outcome to an exit code
pub async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    // Subscriber already set elsewhere (e.g. integration tests); ignore.
    let _ = init_logging(cli.global.verbose, cli.global.log_format);

    let context = command.context();
    match execute(&cli.global, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_line(&context, &e));
            ExitCode::FAILURE
        }
    }
}

async fn execute(global: &GlobalArgs, command: Commands) -> crate::errors::Result<()> {
    let config = config::resolve(global)?;
    log_config_info(&config);

    // Needs no project or credentials, so never builds the clients.
    if let Commands::Config { command: ConfigCommands::Show } = command {
        let view = config::ConfigView::from(&config);
        return output::write_structured(&mut std::io::stdout().lock(), &view, global.output);
    }

    let dispatcher = Dispatcher::connect(config, global.output)?;
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let result = dispatcher.execute(command, &mut stdout.lock(), &mut stderr.lock()).await;
    debug!(ok = result.is_ok(), "Command finished");
    result
}

/// `error[<kind>]: <context>: <message>`
fn error_line(context: &str, error: &VaultError) -> String {
    format!("error[{}]: {}: {}", error.kind(), context, error)
}
