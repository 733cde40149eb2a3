//! gmail-guard - Gmail from the command line
//!
//! Authorizes once through the browser, then keeps the token fresh for
//! every subsequent command.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gmail-guard")]
#[command(about = "Gmail client with automatic OAuth2 token refresh", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store OAuth2 client credentials in the config file
    Configure {
        #[arg(long)]
        client_id: Option<String>,

        #[arg(long)]
        client_secret: Option<String>,

        #[arg(long)]
        redirect_uri: Option<String>,
    },

    /// Print the URL to visit to grant access
    AuthUrl,

    /// Exchange the authorization code from the redirect for tokens
    Login {
        /// Value of the `code` query parameter on the redirect
        #[arg(short, long)]
        code: String,
    },

    /// Refresh the access token now
    Refresh,

    /// Log out and clear cached tokens
    Logout,

    /// Show current authorization status
    Status,

    /// Show mailbox profile (verify auth works)
    Whoami,

    /// List messages
    List {
        /// Gmail search query, e.g. "is:unread"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "10")]
        limit: u32,

        /// Page token from a previous listing
        #[arg(long)]
        page_token: Option<String>,
    },

    /// Read a message
    Read {
        /// Message ID (from `list` output)
        id: String,
    },

    /// Send an email
    Send {
        #[arg(short, long)]
        to: String,

        #[arg(short, long)]
        subject: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        cc: Option<String>,

        #[arg(long)]
        bcc: Option<String>,

        /// Send the body as HTML
        #[arg(long)]
        html: bool,

        /// Message body
        body: String,
    },

    /// List labels
    Labels,

    /// Mark a message as read
    MarkRead { id: String },

    /// Mark a message as unread
    MarkUnread { id: String },

    /// Star a message
    Star { id: String },

    /// Remove the star from a message
    Unstar { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let result = run(cli.command).await;
    if let Err(e) = &result {
        if let Some(hint) = commands::error_hint(e) {
            eprintln!("{}", hint);
        }
    }
    result
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Configure {
            client_id,
            client_secret,
            redirect_uri,
        } => {
            commands::configure(client_id, client_secret, redirect_uri)?;
        }
        Commands::AuthUrl => {
            commands::auth_url()?;
        }
        Commands::Login { code } => {
            commands::login(&code).await?;
        }
        Commands::Refresh => {
            commands::refresh().await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            commands::logout().await?;
        }
        Commands::Status => {
            commands::status()?;
        }
        Commands::Whoami => {
            commands::whoami().await?;
        }
        Commands::List {
            query,
            limit,
            page_token,
        } => {
            tracing::info!("Fetching messages...");
            commands::list(&query, limit, page_token.as_deref()).await?;
        }
        Commands::Read { id } => {
            commands::read(&id).await?;
        }
        Commands::Send {
            to,
            subject,
            from,
            cc,
            bcc,
            html,
            body,
        } => {
            let email = gmail_guard::OutgoingEmail {
                to,
                subject,
                body,
                from,
                cc,
                bcc,
                is_html: html,
            };
            tracing::info!("Sending message...");
            commands::send(&email).await?;
        }
        Commands::Labels => {
            commands::labels().await?;
        }
        Commands::MarkRead { id } => {
            commands::modify(&id, commands::LabelChange::MarkRead).await?;
        }
        Commands::MarkUnread { id } => {
            commands::modify(&id, commands::LabelChange::MarkUnread).await?;
        }
        Commands::Star { id } => {
            commands::modify(&id, commands::LabelChange::Star).await?;
        }
        Commands::Unstar { id } => {
            commands::modify(&id, commands::LabelChange::Unstar).await?;
        }
    }

    Ok(())
}
