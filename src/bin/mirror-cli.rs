use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mirror-cli")]
#[command(about = "Management CLI for the winget mirror", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Admin API key (bearer token)
    #[arg(short, long)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check mirror status
    Status,
    /// Inspect the artifact cache
    Cache,
    /// Drop cached resolutions (everything when no option is given)
    Purge {
        /// One request path, e.g. /manifests/foo/1.0.0/foo.yaml
        #[arg(long, conflicts_with = "prefix")]
        path: Option<String>,
        /// Every cached path under this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show rate limiter state
    RateLimits,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Cache => client.get(format!("{base}/admin/cache")),
        Commands::RateLimits => client.get(format!("{base}/admin/rate-limits")),
        Commands::Purge { path, prefix } => {
            let request = client.post(format!("{base}/admin/cache/purge"));
            match (path, prefix) {
                (Some(path), _) => request.json(&json!({ "path": path })),
                (None, Some(prefix)) => request.json(&json!({ "prefix": prefix })),
                (None, None) => request,
            }
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
