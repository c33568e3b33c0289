//! lisync CLI - LinkedIn post harvesting and publishing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lisync::auth::{CredentialStore, TokenAuthority};
use lisync::feed::{SyncConfig, SyncEngine};
use lisync::session::{Session, SessionCookies};
use lisync::PostsClient;

/// lisync - Harvest a LinkedIn member's posts and publish through the API.
#[derive(Parser)]
#[command(name = "lisync")]
#[command(about = "LinkedIn post harvester and publisher")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest a member's posts into the per-day archive
    Sync {
        /// Public profile id (defaults to the logged-in member)
        profile: Option<String>,

        /// Stop after this many distinct posts
        #[arg(long)]
        limit: Option<usize>,

        /// Output directory for archives
        #[arg(long, default_value = "./posts")]
        output: PathBuf,

        /// Hard cap on scroll rounds
        #[arg(long, default_value = "40")]
        max_rounds: usize,

        /// Session cookie file
        #[arg(long)]
        session: Option<PathBuf>,

        /// Run with a visible browser window
        #[arg(long)]
        headed: bool,
    },

    /// Interactive browser login capturing session cookies
    Login {
        /// Output file for the cookies
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the OAuth consent flow and store API credentials
    Authorize {
        /// Developer app client id
        #[arg(long, env = "LISYNC_CLIENT_ID")]
        client_id: String,

        /// Developer app client secret
        #[arg(long, env = "LISYNC_CLIENT_SECRET")]
        client_secret: String,
    },

    /// Create, edit, or delete posts through the API
    #[command(subcommand)]
    Post(PostCommands),
}

#[derive(Subcommand)]
pub enum PostCommands {
    /// Publish a new post
    Create {
        /// Post text
        text: String,

        /// Post visibility
        #[arg(long, default_value = "PUBLIC")]
        visibility: String,
    },

    /// Replace a post's text
    Edit {
        /// Post id (share or activity urn)
        id: String,

        /// New post text
        text: String,
    },

    /// Delete a post
    Delete {
        /// Post id (share or activity urn)
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("lisync=debug,info")
    } else {
        EnvFilter::new("lisync=info,warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Sync {
            profile,
            limit,
            output,
            max_rounds,
            session,
            headed,
        } => run_sync(profile, limit, output, max_rounds, session, headed).await,
        Commands::Login { output } => run_login(output).await,
        Commands::Authorize {
            client_id,
            client_secret,
        } => run_authorize(client_id, client_secret).await,
        Commands::Post(command) => run_post(command).await,
    }
}

async fn run_sync(
    profile: Option<String>,
    limit: Option<usize>,
    output: PathBuf,
    max_rounds: usize,
    session_path: Option<PathBuf>,
    headed: bool,
) -> Result<()> {
    let session_path = match session_path {
        Some(p) => p,
        None => SessionCookies::default_path()?,
    };
    let cookies = SessionCookies::load_or_env(&session_path)?;

    let engine = SyncEngine::new(SyncConfig {
        output_dir: output,
        limit,
        max_rounds,
        ..SyncConfig::default()
    });

    let session = Session::launch(!headed).await?;
    let outcome = async {
        session.apply_cookies(&cookies).await?;
        engine.run(&session, profile.as_deref()).await
    }
    .await;
    // The browser is released on every exit path; a close failure must not
    // mask why the run itself failed.
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close browser session");
    }
    let outcome = outcome?;

    println!("\n📊 {}", "Sync Summary".bold());
    println!("   Profile:   {}", outcome.profile);
    println!("   Harvested: {}", outcome.harvested);
    println!("   Archived:  {}", outcome.posts.len());
    println!("   File:      {}", outcome.archive_path.display());

    Ok(())
}

async fn run_login(output: Option<PathBuf>) -> Result<()> {
    println!("🔐 lisync - LinkedIn login\n");

    let cookies = Session::interactive_login().await?;

    let output_path = match output {
        Some(p) => p,
        None => SessionCookies::default_path()?,
    };
    cookies.save(&output_path)?;
    println!("✅ Session saved to: {}", output_path.display());

    Ok(())
}

async fn run_authorize(client_id: String, client_secret: String) -> Result<()> {
    println!("🔐 lisync - API authorization\n");

    let authority = TokenAuthority::new(CredentialStore::default_location()?)
        .with_client(client_id, client_secret);

    let creds = authority
        .authorize(|url| {
            println!("Open this URL in your browser to grant access:\n\n   {url}\n");
            open_in_browser(url);
        })
        .await?;

    println!("✅ Authorized as member {}", creds.member_id);
    Ok(())
}

async fn run_post(command: PostCommands) -> Result<()> {
    let authority = TokenAuthority::new(CredentialStore::default_location()?);
    let client = PostsClient::new(authority);

    match command {
        PostCommands::Create { text, visibility } => {
            let id = client.create(&text, &visibility).await?;
            println!("✅ Created post: {id}");
        }
        PostCommands::Edit { id, text } => {
            client.edit(&id, &text).await?;
            println!("✅ Edited post: {id}");
        }
        PostCommands::Delete { id } => {
            client.delete(&id).await?;
            println!("✅ Deleted post: {id}");
        }
    }

    Ok(())
}

/// Best-effort launch of the platform browser; the printed URL is the
/// fallback.
fn open_in_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let command = ("open", vec![url]);
    #[cfg(target_os = "windows")]
    let command = ("cmd", vec!["/C", "start", url]);
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let command = ("xdg-open", vec![url]);

    if let Err(e) = std::process::Command::new(command.0)
        .args(&command.1)
        .spawn()
    {
        tracing::debug!(error = %e, "Could not open browser");
    }
}
