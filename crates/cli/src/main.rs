//! CheapElectra CLI - Database migrations, export and user management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! ce-cli migrate
//!
//! # Export the database to data_dump.json
//! ce-cli dumpdata
//!
//! # Create a staff user
//! ce-cli createsuperuser -u admin -e admin@example.com -p 'a-long-password'
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `dumpdata` - Export the database in fixture form
//! - `createsuperuser` - Create a staff user

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cheap_electra_backend::export::DEFAULT_OUTPUT;

mod commands;

#[derive(Parser)]
#[command(name = "ce-cli")]
#[command(author, version, about = "CheapElectra CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Export the whole database to a JSON file
    Dumpdata {
        /// Output file (overwritten)
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Extra app or app.model label to leave out (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
    },
    /// Create a staff user
    Createsuperuser {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (at least 8 characters, not all digits)
        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Dumpdata { output, exclude } => {
            commands::dumpdata::run(&output, &exclude).await?;
        }
        Commands::Createsuperuser {
            username,
            email,
            password,
        } => {
            commands::users::create_superuser(&username, &email, &password).await?;
        }
    }
    Ok(())
}
