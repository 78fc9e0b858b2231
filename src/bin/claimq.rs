//! claimq CLI — operator interface to project claims queues.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use claimq::brigade::{Brigade, Stakeholder};
use claimq::config::Config;
use claimq::engine::Flush;
use claimq::error::Result;
use claimq::model::{Claim, ClaimDraft};
use claimq::project::Project;
use claimq::queue::Claims;
use claimq::storage::FsStore;

#[derive(Parser)]
#[command(name = "claimq", about = "Project claims queue operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post a claim to a project's queue
    Post {
        /// Project id
        project: String,
        /// Claim kind (the event name)
        kind: String,
        /// Correlation token
        #[arg(long)]
        token: Option<String>,
        /// JSON parameters
        #[arg(long)]
        params: Option<String>,
        /// Reject the claim if the same kind and token is already pending
        #[arg(long)]
        unique: bool,
    },
    /// List pending claims
    List {
        /// Project id
        project: String,
    },
    /// Drain the queue, printing each claim as it is delivered
    Flush {
        /// Project id
        project: String,
    },
}

/// Stakeholder that prints every delivered claim to stdout.
struct Echo;

#[async_trait]
impl Stakeholder for Echo {
    async fn process(&self, _project: &Arc<Project>, claim: &Claim) -> Result<()> {
        println!("{}  token={}", claim, claim.token.as_deref().unwrap_or("-"));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    claimq::telemetry::init(&config.log_level)?;

    let store = Arc::new(FsStore::open(&config.data_dir)?);
    let cli = Cli::parse();

    match cli.command {
        Command::Post {
            project,
            kind,
            token,
            params,
            unique,
        } => {
            let project = Project::new(store, &project);
            cmd_post(&project, kind, token, params, unique).await
        }
        Command::List { project } => {
            let project = Project::new(store, &project);
            cmd_list(&project).await
        }
        Command::Flush { project } => {
            let project = Project::new(store, &project);
            let brigade = Arc::new(Brigade::new(vec![Arc::new(Echo)]));
            let flushed = Flush::new(project, brigade).run().await?;
            println!("\n{flushed} claim(s) delivered");
            Ok(())
        }
    }
}

async fn cmd_post(
    project: &Arc<Project>,
    kind: String,
    token: Option<String>,
    params: Option<String>,
    unique: bool,
) -> anyhow::Result<()> {
    let params: serde_json::Value = match params {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::json!({}),
    };

    let mut draft = ClaimDraft::new(kind).params(params);
    if let Some(token) = token {
        draft = draft.token(token);
    }

    let guard = Claims::new(project).lock().await?;
    let posted = if unique {
        guard.post_unique(draft).await
    } else {
        guard.post(draft).await
    };
    guard.release().await?;

    let claim = posted?;
    println!("Posted: {claim}");
    Ok(())
}

async fn cmd_list(project: &Arc<Project>) -> anyhow::Result<()> {
    let guard = Claims::new(project).lock().await?;
    let listed = guard.iterate().await;
    guard.release().await?;
    let claims = listed?;

    if claims.is_empty() {
        println!("No pending claims.");
        return Ok(());
    }

    println!("{:<8}  {:<20}  {:<12}  CREATED", "NUMBER", "KIND", "TOKEN");
    println!("{}", "-".repeat(64));
    for claim in &claims {
        println!(
            "{:<8}  {:<20}  {:<12}  {}",
            claim.number,
            claim.kind,
            claim.token.as_deref().unwrap_or("-"),
            claim.created.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} claim(s)", claims.len());
    Ok(())
}
