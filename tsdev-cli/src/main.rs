//! tsdev CLI - scaffold, develop, build and migrate TypeScript services.

mod commands;
mod error;
mod output;
mod toolchain;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "tsdev")]
#[command(author, version, about = "CLI tool for TypeScript services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display version information
    Version,
    /// Create a new project from the template
    New {
        /// Directory to create the project in
        path: Option<String>,
    },
    /// Compile in watch mode and restart the app on changes
    Dev,
    /// Build the project for production
    Build {
        /// Skip installing production dependencies into the build directory
        #[arg(long)]
        clean: bool,
        /// Show compiler and installer output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Generate a new migration file
    #[command(name = "migration:make")]
    MigrationMake {
        /// Name of the migration (e.g., create_users)
        name: Option<String>,
    },
    /// Apply all pending migrations
    #[command(name = "migration:run")]
    MigrationRun,
    /// Revert the latest batch of migrations
    #[command(name = "migration:rollback")]
    MigrationRollback {
        /// Revert every batch
        #[arg(long)]
        all: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Some(Commands::Build { verbose: true, .. }));
    init_tracing(verbose);

    let Some(command) = cli.command else {
        print_banner();
        println!();
        println!("Run {} for usage information.", "tsdev --help".cyan());
        return;
    };

    if let Err(e) = dispatch(command) {
        report(&e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::New { path } => commands::new::execute(path.as_deref()),
        Commands::Dev => commands::dev::execute(),
        Commands::Build { clean, verbose } => {
            commands::build::execute(commands::build::BuildOptions { clean, verbose })
        }
        Commands::MigrationMake { name } => commands::migrate::make(name.as_deref()),
        Commands::MigrationRun => commands::migrate::run(),
        Commands::MigrationRollback { all } => commands::migrate::rollback(all),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "tsdev=debug,tsdev_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(err: &CliError) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    match err {
        CliError::Usage(_) => {
            eprintln!();
            eprintln!("Run {} for usage information.", "tsdev --help".cyan());
        }
        CliError::MissingDependency { remediation, .. } => {
            eprintln!();
            eprintln!("{}", remediation);
        }
        CliError::Failed(_) => {}
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        "  ╭─────────────────────────────────────╮".bright_magenta()
    );
    println!(
        "{}",
        "  │                                     │".bright_magenta()
    );
    println!(
        "{}{}{}",
        "  │".bright_magenta(),
        "              tsdev CLI              ".bold(),
        "│".bright_magenta()
    );
    println!(
        "{}",
        "  │                                     │".bright_magenta()
    );
    println!(
        "{}",
        "  ╰─────────────────────────────────────╯".bright_magenta()
    );
}

fn print_version() {
    println!("tsdev {}", env!("CARGO_PKG_VERSION"));
}
