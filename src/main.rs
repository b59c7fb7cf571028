//! Warehouse Gate - warehouse CRUD behind identity-provider bearer tokens

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use warehouse_gate::{
    auth::{Authorizer, check},
    cli::{Cli, Command},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Verify {
            ref token,
            ref permission,
        }) => run_verify(&config, token, permission.as_deref()).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> warehouse_gate::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Validate configuration and print the effective auth settings
fn run_check_config(config: &Config) -> ExitCode {
    if let Err(e) = config.auth.validate() {
        eprintln!("❌ Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    println!("✅ Configuration is valid");
    println!("   Issuer:   {}", config.auth.issuer);
    println!("   Audience: {}", config.auth.audience);
    println!("   JWKS:     {}", config.auth.resolved_jwks_url());
    println!("   Claim:    {}", config.auth.permission_claim);
    println!("   Listen:   {}:{}", config.server.host, config.server.port);
    ExitCode::SUCCESS
}

/// Verify a token from the command line
async fn run_verify(config: &Config, token: &str, permission: Option<&str>) -> ExitCode {
    let authorizer = match Authorizer::from_config(&config.auth) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let verified = match authorizer.verifier().verify(token).await {
        Ok(claims) => claims,
        Err(denied) => {
            eprintln!("❌ {denied}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match permission {
        Some(required) => check(verified, required),
        None => Ok(verified),
    };

    match outcome {
        Ok(claims) => match serde_json::to_string_pretty(&claims) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize claims: {e}");
                ExitCode::FAILURE
            }
        },
        Err(denied) => {
            eprintln!("❌ {denied}");
            ExitCode::FAILURE
        }
    }
}

/// Run the server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        issuer = %config.auth.issuer,
        "Starting Warehouse Gate"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}
