use std::fs;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use leadgen::poll::{poll_until_terminal, PollConfig, PollOutcome};
use leadgen::providers::HttpStatusClient;

const TOKEN_FILE: &str = ".leadgen_token";

#[derive(Parser)]
#[command(name = "leadgen-cli")]
#[command(about = "CLI for the leadgen report service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create a report and start generation
    CreateReport {
        #[arg(short, long)]
        project: String,
        /// Lead data as a JSON object
        #[arg(short, long)]
        lead: String,
        /// Comma-separated section keys (default: all)
        #[arg(short, long)]
        sections: Option<String>,
    },
    /// Poll a report until generation finishes, then print the record
    Watch {
        #[arg(short, long)]
        id: Uuid,
        /// Poll interval in seconds
        #[arg(short = 'n', long, default_value_t = 2)]
        interval: u64,
    },
    ListReports,
    /// Restart generation for a finished report
    Regenerate {
        #[arg(short, long)]
        id: Uuid,
    },
    CreateUser {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        role: String,
        /// Comma-separated project names
        #[arg(long, default_value = "")]
        projects: String,
    },
    ListUsers,
    DeleteUser {
        #[arg(short, long)]
        id: Uuid,
    },
    Logout,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn saved_token() -> String {
    fs::read_to_string(TOKEN_FILE).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{}/login", cli.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::CreateReport {
            project,
            lead,
            sections,
        } => {
            let lead: serde_json::Value = serde_json::from_str(&lead)?;
            let mut body = json!({ "project": project, "lead": lead });
            if let Some(sections) = sections {
                let keys: Vec<&str> = sections.split(',').map(str::trim).collect();
                body["enabled_sections"] = json!(keys);
            }
            let res = client
                .post(format!("{}/reports", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&body)
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Watch { id, interval } => {
            let status_client = HttpStatusClient::new(cli.url.clone(), saved_token());
            let config = PollConfig {
                interval: Duration::from_secs(interval),
            };

            // Ctrl-C tears the campaign down instead of killing mid-request
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });

            println!("Watching report {id} (Ctrl-C to stop)...");
            match poll_until_terminal(&status_client, id, config, cancel_rx).await {
                PollOutcome::Completed(report) => {
                    println!("✅ Report completed:");
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                PollOutcome::Failed(message) => {
                    println!("❌ Generation failed: {message}");
                    println!("Use `regenerate --id {id}` to retry.");
                }
                PollOutcome::Cancelled => {
                    println!("Stopped watching. Generation continues server-side.");
                }
            }
        }
        Commands::ListReports => {
            let res = client
                .get(format!("{}/reports", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Regenerate { id } => {
            let res = client
                .post(format!("{}/reports/{}/regenerate", cli.url, id))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateUser {
            email,
            password,
            role,
            projects,
        } => {
            let projects: Vec<&str> = projects
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            let res = client
                .post(format!("{}/users", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({
                    "email": email,
                    "password": password,
                    "role": role,
                    "assigned_projects": projects
                }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ListUsers => {
            let res = client
                .get(format!("{}/users", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::DeleteUser { id } => {
            let res = client
                .delete(format!("{}/users/{}", cli.url, id))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Status: {}", res.status());
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Token removed.");
        }
    }

    Ok(())
}
