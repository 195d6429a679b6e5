use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tradebot-cli")]
#[command(about = "Query a running tradebot through its status API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9050")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Engine name, uptime and running subsystem count
    Health,
    /// Every subsystem with its state
    Subsystems,
    /// One subsystem's state
    Subsystem { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let path = match &cli.command {
        Commands::Health => "/health".to_string(),
        Commands::Subsystems => "/subsystems".to_string(),
        Commands::Subsystem { name } => format!("/subsystems/{name}"),
    };

    let res = client.get(format!("{}{}", cli.url.trim_end_matches('/'), path)).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: status API returned {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
