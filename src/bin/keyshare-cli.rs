use std::io::Read;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;

use keyshare_proxy::secret;

#[derive(Parser)]
#[command(name = "keyshare-cli")]
#[command(about = "Operator tools for the split-key gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a secret into a server share and a client share
    Split {
        /// Secret to split; read from stdin when omitted
        secret: Option<String>,
    },
    /// Generate a random bypass token
    BypassToken {
        /// Number of random bytes
        #[arg(short, long, default_value_t = 32)]
        bytes: usize,
    },
    /// Query a running gateway
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Split { secret } => {
            let secret = match secret {
                Some(s) => s,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf.trim_end_matches(['\r', '\n']).to_string()
                }
            };
            if secret.is_empty() {
                return Err("secret is empty".into());
            }
            let shares = secret::split(secret.as_bytes());
            println!("server_share = \"{}\"", shares.server);
            println!("client_share = \"{}\"", shares.client);
            println!("placeholder  = \"%PARTIAL_KEY:{}%\"", shares.client);
        }
        Commands::BypassToken { bytes } => {
            if bytes < 16 {
                return Err("bypass tokens need at least 16 random bytes".into());
            }
            let mut raw = vec![0u8; bytes];
            OsRng.fill_bytes(&mut raw);
            println!("{}", URL_SAFE_NO_PAD.encode(raw));
        }
        Commands::Health { url } => {
            let client = reqwest::Client::new();
            let base = url.trim_end_matches('/');

            let health = client.get(format!("{}/health", base)).send().await?;
            println!("health: {}", health.status());

            let version = client.get(format!("{}/version", base)).send().await?;
            print_response(version).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
