// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! mTLS Enrollment Command-Line Tool
//!
//! Drives the browser enrollment flow from a terminal. The login round trip
//! spans two invocations: `start` prints the sign-in URL, and `callback`
//! takes the URL the identity provider redirected to. Session data lives in
//! a state file between the two.
//!
//! # Usage
//!
//! ```text
//! mtls-enroll [OPTIONS] <COMMAND>
//!
//! Commands:
//!   start     Begin enrollment (prints the sign-in URL)
//!   callback  Complete the login and enroll
//!   fetch     Enroll with a directly fetched or static token
//!   revoke    Revoke a certificate by serial number
//!   health    Check the CA health endpoint
//!   clear     Discard a pending login
//!   status    Show configuration and pending login state
//! ```
//!
//! # Examples
//!
//! ```bash
//! mtls-enroll --config enroll.toml --page-url https://enroll.example.com/ start
//! mtls-enroll callback 'https://enroll.example.com/?code=...&state=...'
//! mtls-enroll --output ./certs fetch --token "$ID_TOKEN"
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mtls_enroll::artifacts::{ArtifactManager, MemoryObjectUrls};
use mtls_enroll::config::ConfigLoader;
use mtls_enroll::logging::{self, LogConfig, LogLevel};
use mtls_enroll::navigation::MemoryNavigator;
use mtls_enroll::storage::FileStore;
use mtls_enroll::{
    CaClient, EnrollConfig, EnrollmentFlow, EnrollmentState, ObjectUrls, TokenStrategy,
};
use url::Url;

type CliFlow<'a> = EnrollmentFlow<&'a FileStore, &'a MemoryNavigator, &'a MemoryObjectUrls>;

/// mTLS client certificate enrollment
#[derive(Parser)]
#[command(name = "mtls-enroll")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Obtain an mTLS client certificate via OIDC sign-in", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Page URL the flow runs on; also the OIDC redirect URI
    #[arg(
        long,
        global = true,
        value_name = "URL",
        default_value = "http://localhost:8080/"
    )]
    page_url: Url,

    /// Session state file
    #[arg(long, global = true, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Directory the certificate and key are written to
    #[arg(short, long, global = true, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Begin enrollment; prints the sign-in URL to open in a browser
    Start,

    /// Complete the login with the URL the identity provider redirected to
    Callback {
        /// Full redirect URL including `code` and `state`
        url: Url,
    },

    /// Enroll with a token fetched from the token endpoint, or a given one
    Fetch {
        /// Use this token instead of contacting the token endpoint
        #[arg(long, env = "MTLS_ENROLL_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Revoke a certificate
    Revoke {
        /// Certificate serial number
        serial_number: String,

        /// Revocation reason
        #[arg(long)]
        reason: Option<String>,
    },

    /// Check the CA health endpoint
    Health,

    /// Discard a pending login
    Clear,

    /// Show configuration and pending login state
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LogLevel::Error
    } else if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut log_config = LogConfig::default().with_level(level);
    if cli.json_logs {
        log_config = log_config.with_json();
    }
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = load_config(&cli)?;

    match &cli.command {
        Commands::Start => {
            let store = FileStore::new(state_file(&cli)?);
            let navigator = MemoryNavigator::new(cli.page_url.clone());
            let urls = MemoryObjectUrls::new();
            let flow = EnrollmentFlow::new(config, &store, &navigator, &urls)?;
            cmd_start(&cli, &flow).await
        }
        Commands::Callback { url } => {
            let store = FileStore::new(state_file(&cli)?);
            let navigator = MemoryNavigator::new(url.clone());
            let urls = MemoryObjectUrls::new();
            let flow = EnrollmentFlow::new(config, &store, &navigator, &urls)?;
            cmd_callback(&cli, &flow).await
        }
        Commands::Fetch { token } => {
            config.token_strategy = TokenStrategy::DirectFetch {
                static_token: token.clone(),
            };
            let store = FileStore::new(state_file(&cli)?);
            let navigator = MemoryNavigator::new(cli.page_url.clone());
            let urls = MemoryObjectUrls::new();
            let flow = EnrollmentFlow::new(config, &store, &navigator, &urls)?;
            let state = flow.start_enrollment().await;
            finish(&cli, &flow, state)
        }
        Commands::Revoke {
            serial_number,
            reason,
        } => {
            let client = CaClient::new(config.into())?;
            let response = client
                .revoke(&cli.page_url, serial_number, reason.as_deref())
                .await?;
            println!("{}", response.message);
            if let Some(output) = response.output {
                println!("{}", output);
            }
            Ok(true)
        }
        Commands::Health => {
            let client = CaClient::new(config.into())?;
            let health = client.health(&cli.page_url).await?;
            println!("{}", if health.healthy { "healthy" } else { "unhealthy" });
            Ok(health.healthy)
        }
        Commands::Clear => {
            let store = FileStore::new(state_file(&cli)?);
            mtls_enroll::PkceCorrelator::new(&store).clear()?;
            println!("Pending login cleared.");
            Ok(true)
        }
        Commands::Status => cmd_status(&cli, &config),
    }
}

fn load_config(cli: &Cli) -> Result<EnrollConfig, Box<dyn std::error::Error>> {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }

    match loader.load() {
        Ok(config) => Ok(config),
        // Without an explicit file the defaults are reported as missing settings
        Err(e) if cli.config.is_none() => {
            tracing::debug!("{}", e);
            Ok(EnrollConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn state_file(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref path) = cli.state_file {
        return Ok(path.clone());
    }
    let dir = dirs::cache_dir().ok_or("No cache directory; use --state-file")?;
    Ok(dir.join("mtls-enroll").join("session.json"))
}

async fn cmd_start(cli: &Cli, flow: &CliFlow<'_>) -> Result<bool, Box<dyn std::error::Error>> {
    let state = flow.start_enrollment().await;

    if state == EnrollmentState::AwaitingLogin {
        if let Some(url) = flow.navigator().last_assigned() {
            if !cli.quiet {
                println!("Open this URL in a browser to sign in:");
            }
            println!("{}", url);
            if !cli.quiet {
                println!();
                println!("Then run: mtls-enroll callback '<redirect URL>'");
            }
        }
        return Ok(true);
    }

    finish(cli, flow, state)
}

async fn cmd_callback(cli: &Cli, flow: &CliFlow<'_>) -> Result<bool, Box<dyn std::error::Error>> {
    let state = flow.resume_from_callback().await;
    if state == EnrollmentState::Idle {
        eprintln!("The URL carries no login callback parameters.");
        return Ok(false);
    }
    finish(cli, flow, state)
}

fn finish(
    cli: &Cli,
    flow: &CliFlow<'_>,
    state: EnrollmentState,
) -> Result<bool, Box<dyn std::error::Error>> {
    match state {
        EnrollmentState::Ready => {
            let artifacts = flow.artifacts();
            for path in write_artifacts(&artifacts, &cli.output)? {
                if !cli.quiet {
                    println!("Wrote {}", path.display());
                }
            }
            println!("{}", flow.status());
            Ok(true)
        }
        EnrollmentState::SignedIn => {
            println!("{}", flow.status());
            Ok(true)
        }
        _ => {
            eprintln!("{}", flow.status());
            Ok(false)
        }
    }
}

fn write_artifacts<U: ObjectUrls>(
    artifacts: &ArtifactManager<U>,
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut written = Vec::new();
    for artifact in [artifacts.certificate(), artifacts.private_key()]
        .into_iter()
        .flatten()
    {
        written.push(artifact.write_to(dir)?);
    }

    if let Some(ca) = artifacts.ca_text() {
        let path = dir.join("ca.crt");
        std::fs::write(&path, ca)?;
        written.push(path);
    }

    Ok(written)
}

fn cmd_status(cli: &Cli, config: &EnrollConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let state_file = state_file(cli)?;
    let store = FileStore::new(&state_file);
    let pending = mtls_enroll::PkceCorrelator::new(&store).is_pending()?;

    let strategy = match config.token_strategy {
        TokenStrategy::AuthorizationCode => "authorization code (PKCE)",
        TokenStrategy::DirectFetch { .. } => "direct fetch",
    };

    println!("Token source:   {}", strategy);
    println!("Subject:        {}", config.certificate.subject);
    println!("Sign endpoint:  {}", config.sign_url(&cli.page_url)?);
    println!("State file:     {}", state_file.display());
    println!("Login pending:  {}", if pending { "yes" } else { "no" });

    let missing = config.missing();
    if missing.is_empty() {
        println!("Configuration:  complete");
        Ok(true)
    } else {
        println!("Configuration:  missing {}", missing.join(", "));
        Ok(false)
    }
}
