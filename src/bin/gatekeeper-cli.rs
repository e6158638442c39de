use std::sync::Arc;

use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use gatekeeper::clock::SystemClock;
use gatekeeper::TokenVerifier;

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Operator CLI for the request gatekeeper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a bearer token offline and print its claims or the rejection reason
    Verify {
        /// Token, with or without the "Bearer " prefix
        token: String,

        #[arg(long, env = "JWT_SECRET_KEY", hide_env_values = true)]
        secret: String,

        #[arg(long, env = "JWT_ISSUER", default_value = "auth")]
        issuer: String,
    },
    /// Send a GET through a running gatekeeper and print the outcome
    Probe {
        url: String,

        #[arg(short, long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            token,
            secret,
            issuer,
        } => {
            let verifier = TokenVerifier::new(secret.as_bytes(), issuer, 8192, Arc::new(SystemClock));
            match verifier.verify(Some(&token)) {
                Ok(claims) => {
                    println!("{}", serde_json::to_string_pretty(&claims)?);
                }
                Err(reason) => {
                    eprintln!("Rejected: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Probe { url, token } => {
            let client = reqwest::Client::new();
            let mut request = client.get(&url);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            print_response(request.send().await?).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    println!("Status: {status} (request id {request_id})");

    if let Some(retry_after) = res.headers().get(reqwest::header::RETRY_AFTER) {
        println!("Retry-After: {}", retry_after.to_str().unwrap_or("?"));
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
