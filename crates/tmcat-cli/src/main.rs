mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{load_registry, repo_spec, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tmcat",
    version,
    about = "Catalog of Thing Model documents across file and HTTP repositories"
)]
struct Cli {
    /// Path to the repositories config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name of the configured repository to address.
    #[arg(short, long, global = true, conflicts_with = "directory")]
    repo: Option<String>,

    /// Ad-hoc repository rooted at this directory.
    #[arg(short, long, global = true)]
    directory: Option<PathBuf>,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a TM file into the catalog.
    Push {
        /// Path to the TM JSON file.
        file: PathBuf,
        /// Extra path segments appended to the TM name.
        #[arg(long, default_value = "")]
        opt_path: String,
    },
    /// Fetch a TM by id or NAME[:SEMVER] and print it to stdout.
    Fetch {
        name: String,
        /// Restore the original (external) id on the way out.
        #[arg(long, default_value_t = false)]
        restore_id: bool,
        /// Write the TM to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List catalog entries across repositories.
    List {
        /// Name prefix (whole path segments).
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        author: Vec<String>,
        #[arg(long)]
        manufacturer: Vec<String>,
        #[arg(long)]
        mpn: Vec<String>,
        /// Substring search over names, manufacturers, mpns, and descriptions.
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List all stored versions of a TM name.
    Versions { name: String },
    /// Delete a single TM by exact id.
    Delete { id: String },
    /// Rebuild a repository's index, or update it for the given ids.
    Index { ids: Vec<String> },
    /// Manage configured repositories.
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Serve a filesystem repository over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// Print completion candidates (used by shell completion scripts).
    #[command(hide = true)]
    Complete {
        kind: String,
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Generate a shell completion script.
    Completions { shell: Shell },
}

#[derive(Debug, Subcommand)]
enum RepoCommands {
    /// Add a named repository backed by a directory or a catalog URL.
    Add {
        name: String,
        #[arg(long, conflicts_with = "url")]
        dir: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        auth_token: Option<String>,
    },
    /// Show configured repositories.
    List,
    /// Remove a named repository from the config.
    Remove { name: String },
    /// Rename a configured repository.
    Rename { old: String, new: String },
    /// Mark a repository as the default target.
    SetDefault { name: String },
    /// Enable or disable a repository.
    Toggle { name: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TMCAT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match dispatch(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<u8, String> {
    let spec = repo_spec(cli.repo.as_ref(), cli.directory.as_ref());

    match &cli.command {
        Commands::Push { file, opt_path } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::push::run(&registry, &spec, file, opt_path)
        }
        Commands::Fetch {
            name,
            restore_id,
            output,
        } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::fetch::run(&registry, &spec, name, *restore_id, output.as_deref())
        }
        Commands::List {
            name,
            author,
            manufacturer,
            mpn,
            search,
        } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::list::run(
                &registry,
                &spec,
                name.as_ref(),
                author,
                manufacturer,
                mpn,
                search.as_ref(),
            )
        }
        Commands::Versions { name } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::versions::run(&registry, &spec, name)
        }
        Commands::Delete { id } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::index::delete(&registry, &spec, id)
        }
        Commands::Index { ids } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::index::run(&registry, &spec, ids)
        }
        Commands::Repo { command } => {
            let mut registry = load_registry(cli.config.as_ref())?;
            match command {
                RepoCommands::Add {
                    name,
                    dir,
                    url,
                    auth_token,
                } => commands::repo::add(
                    &mut registry,
                    name,
                    dir.as_ref(),
                    url.as_ref(),
                    auth_token.as_ref(),
                ),
                RepoCommands::List => commands::repo::list(&registry),
                RepoCommands::Remove { name } => commands::repo::remove(&mut registry, name),
                RepoCommands::Rename { old, new } => {
                    commands::repo::rename(&mut registry, old, new)
                }
                RepoCommands::SetDefault { name } => {
                    commands::repo::set_default(&mut registry, name)
                }
                RepoCommands::Toggle { name } => commands::repo::toggle(&mut registry, name),
            }
        }
        Commands::Serve { addr } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::serve::run(&registry, &spec, addr)
        }
        Commands::Complete { kind, prefix } => {
            let registry = load_registry(cli.config.as_ref())?;
            commands::complete::run(&registry, &spec, kind, prefix)
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "tmcat", &mut std::io::stdout());
            Ok(commands::EXIT_SUCCESS)
        }
    }
}
