//! imagehub: push, clone and check image repositories.
//!
//! # Usage
//!
//! ```bash
//! imagehub register --username alice --email alice@example.org
//! imagehub push http://localhost:5000/alice/cats
//! imagehub clone -u alice/cats --extract
//! imagehub check
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Env;
use imagehub_client::{ClientConfig, Login, TransferClient};
use imagehub_protocol::{CheckStatus, RegisterRequest};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Sync folders of images with an imagehub server.
#[derive(Parser, Debug)]
#[command(name = "imagehub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:50051")]
    server: String,

    /// Prefix used to expand bare `owner/folder` repository arguments
    #[arg(long, default_value = "http://localhost:5000/")]
    base_url: String,

    /// Seconds to wait for the connection to open
    #[arg(long, default_value = "20")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Push the current folder to a repository
    Push {
        /// Repository URL or `owner/folder`, e.g. http://localhost:5000/alice/cats
        url: String,
        /// Folder to push
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Username or email (prompted when omitted)
        #[arg(long)]
        username: Option<String>,
        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Clone the latest snapshot of a repository
    Clone {
        /// Repository URL
        url: Option<String>,
        /// Repository URL, alternative to the positional argument
        #[arg(short = 'u', long = "url", conflicts_with = "url")]
        url_flag: Option<String>,
        /// Directory to clone into
        #[arg(long, default_value = ".")]
        into: PathBuf,
        /// Unpack the downloaded package
        #[arg(long)]
        extract: bool,
    },

    /// Check whether a cloned folder is up to date
    Check {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = ClientConfig::new(args.server)
        .with_base_url(args.base_url)
        .with_connect_timeout(Duration::from_secs(args.timeout));
    let client = TransferClient::new(config);

    match args.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let (password, confirmation) = match password {
                Some(password) => (password.clone(), password),
                None => (prompt("Password")?, prompt("Confirm password")?),
            };
            let response = client
                .register(RegisterRequest {
                    username,
                    email,
                    password,
                    password_confirmation: confirmation,
                })
                .await
                .context("register failed")?;
            info!(
                "Registered {} <{}> (id {})",
                response.username, response.email, response.id
            );
        }

        Command::Push {
            url,
            dir,
            username,
            password,
        } => {
            let username = match username {
                Some(username) => username,
                None => prompt("Username or email")?,
            };
            let password = match password {
                Some(password) => password,
                None => prompt("Password")?,
            };
            let response = client
                .push(&dir, &url, &Login::new(username, password))
                .await
                .with_context(|| format!("push of {} failed", dir.display()))?;
            println!("{}", response.result);
        }

        Command::Clone {
            url,
            url_flag,
            into,
            extract,
        } => {
            let url = match url.or(url_flag) {
                Some(url) => url,
                None => bail!("a repository URL is required"),
            };
            let cloned = client
                .clone_repository(&url, &into, extract)
                .await
                .with_context(|| format!("clone of {} failed", url))?;
            info!(
                "Cloned {}/{} at fingerprint {} into {}",
                cloned.metadata.owner,
                cloned.metadata.folder_name,
                cloned.metadata.fingerprint,
                cloned.dir.display()
            );
            if extract {
                info!("Extracted {} file(s)", cloned.extracted.len());
            }
        }

        Command::Check { dir } => {
            let status = client
                .check(&dir)
                .await
                .with_context(|| format!("check of {} failed", dir.display()))?;
            match status {
                CheckStatus::UpToDate => println!("Up to date"),
                CheckStatus::UpdateFound => println!("Update found"),
            }
        }
    }

    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{} must not be empty", label.to_lowercase());
    }
    Ok(value)
}
