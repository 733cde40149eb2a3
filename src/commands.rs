//! Command handlers for the CLI

use anyhow::{Context, Result};

use gmail_guard::{
    CallError, Config, Credentials, FileStore, GmailClient, GmailError, MessageFormat,
    OutgoingEmail, ReqwestTokenHttp, TokenGuard,
};

type CliGuard = TokenGuard<FileStore, ReqwestTokenHttp>;
type CliClient = GmailClient<FileStore, ReqwestTokenHttp>;

/// Build a guard over the config file with the given credentials.
fn build_guard(config: &Config, credentials: Credentials) -> Result<CliGuard> {
    let http = ReqwestTokenHttp::new(config.settings.request_timeout())
        .context("Failed to build HTTP client")?;
    let store = FileStore::default_location()?;
    let guard = TokenGuard::new(credentials, store, http)
        .context("Failed to load stored tokens")?
        .with_expiry_margin(config.settings.expiry_margin_secs);
    Ok(guard)
}

/// Load config, validate credentials and build the Gmail client.
fn build_client() -> Result<CliClient> {
    let config = Config::load().context("Failed to load config")?;
    let credentials = config
        .credentials()
        .context("Client credentials incomplete. Run 'gmail-guard configure'.")?;
    let guard = build_guard(&config, credentials)?;
    GmailClient::new(guard, config.settings.request_timeout())
        .context("Failed to build Gmail client")
}

/// Update stored client credentials; unspecified fields are kept.
pub fn configure(
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
) -> Result<()> {
    let mut config = Config::load().context("Failed to load config")?;
    if let Some(id) = client_id {
        config.credentials.client_id = id;
    }
    if let Some(secret) = client_secret {
        config.credentials.client_secret = secret;
    }
    if let Some(uri) = redirect_uri {
        config.credentials.redirect_uri = uri;
    }
    config.save().context("Failed to save config")?;

    println!("Configuration saved to {}", Config::config_path()?.display());
    if let Err(e) = config.credentials.validate() {
        println!("Note: {}", e);
    }
    Ok(())
}

pub fn auth_url() -> Result<()> {
    let client = build_client()?;
    println!();
    println!("To authorize, visit:");
    println!("  {}", client.guard().authorize_url());
    println!();
    println!("Then run: gmail-guard login --code <code from the redirect URL>");
    Ok(())
}

pub async fn login(code: &str) -> Result<()> {
    let client = build_client()?;
    let grant = client
        .guard()
        .exchange_code(code)
        .await
        .context("Login failed")?;

    if grant.refresh_token.is_none() && !client.guard().status().has_refresh_token {
        eprintln!("Warning: no refresh token issued; you will need to log in again on expiry.");
    }
    println!("Login successful.");
    Ok(())
}

pub async fn refresh() -> Result<()> {
    let client = build_client()?;
    client
        .guard()
        .refresh()
        .await
        .context("Token refresh failed. Run 'gmail-guard auth-url' to re-authorize.")?;
    println!("Token refreshed successfully.");
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let guard = build_guard(&config, config.credentials.clone())?;
    guard.reset().await.context("Failed to clear tokens")?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub fn status() -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let guard = build_guard(&config, config.credentials.clone())?;
    let status = guard.status();

    match config.credentials.validate() {
        Ok(()) => println!("Credentials: configured"),
        Err(e) => println!("Credentials: incomplete ({})", e),
    }

    match (status.authorized, status.expired) {
        (true, false) => {
            println!("Access token: valid");
            println!("  expires_at: {}", status.expires_at);
        }
        (true, true) => println!("Access token: expired"),
        (false, _) => println!("Access token: none"),
    }

    if status.has_refresh_token {
        println!("Refresh tok:  present");
    } else {
        println!("Refresh tok:  none");
    }

    if !status.authorized {
        println!("\nRun 'gmail-guard auth-url' to authenticate.");
    }
    Ok(())
}

/// Fetch and display the mailbox profile.
pub async fn whoami() -> Result<()> {
    let client = build_client()?;
    let profile = client.profile().await.context("Failed to fetch profile")?;

    println!();
    println!("Email:    {}", profile.email_address);
    println!("Messages: {}", profile.messages_total);
    println!("Threads:  {}", profile.threads_total);
    Ok(())
}

pub async fn list(query: &str, limit: u32, page_token: Option<&str>) -> Result<()> {
    let client = build_client()?;
    let page = client
        .fetch_messages(query, limit, page_token)
        .await
        .context("Failed to fetch messages")?;

    println!("\nMessages:");
    println!("{:-<60}", "");

    for message in &page.messages {
        let marker = if message.is_unread() { "*" } else { " " };
        println!(
            "{} {}",
            marker,
            message.subject().unwrap_or("(no subject)")
        );
        println!("  ID:   {}", message.id);
        println!("  From: {}", message.sender().unwrap_or("unknown"));
        println!("  Date: {}", message.date().unwrap_or("unknown"));
        if let Some(snippet) = message.snippet.as_deref().filter(|s| !s.is_empty()) {
            println!("  {}", truncate(snippet, 80));
        }
        println!();
    }

    if page.messages.is_empty() {
        println!("  (no messages found)");
    }

    if let Some(token) = page.next_page_token {
        println!("(more available: --page-token {})", token);
    }
    Ok(())
}

pub async fn read(id: &str) -> Result<()> {
    let client = build_client()?;
    let message = client
        .get_message(id, MessageFormat::Full)
        .await
        .context("Failed to fetch message")?;

    println!();
    println!("Subject: {}", message.subject().unwrap_or("(no subject)"));
    println!("From:    {}", message.sender().unwrap_or("unknown"));
    println!("To:      {}", message.to().unwrap_or("unknown"));
    println!("Date:    {}", message.date().unwrap_or("unknown"));
    println!("Labels:  {}", message.label_ids.join(", "));
    println!();
    println!("{}", message.snippet.as_deref().unwrap_or(""));
    Ok(())
}

pub async fn send(email: &OutgoingEmail) -> Result<()> {
    let client = build_client()?;
    let id = client
        .send_message(email)
        .await
        .context("Failed to send email")?;
    println!("Message sent successfully (id: {}).", id);
    Ok(())
}

pub async fn labels() -> Result<()> {
    let client = build_client()?;
    let labels = client.list_labels().await.context("Failed to fetch labels")?;

    println!("\nLabels:");
    for label in &labels {
        println!("  {:<30} {}", label.name, label.id);
    }
    if labels.is_empty() {
        println!("  (no labels found)");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum LabelChange {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
}

pub async fn modify(id: &str, change: LabelChange) -> Result<()> {
    let client = build_client()?;
    let result = match change {
        LabelChange::MarkRead => client.mark_read(id).await,
        LabelChange::MarkUnread => client.mark_unread(id).await,
        LabelChange::Star => client.star(id).await,
        LabelChange::Unstar => client.unstar(id).await,
    };
    result.with_context(|| format!("Failed to update message {}", id))?;
    println!("Message {} updated.", id);
    Ok(())
}

/// Extra advice for failures the user can act on.
pub fn error_hint(err: &anyhow::Error) -> Option<&'static str> {
    let timed_out = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<CallError<GmailError>>(),
            Some(CallError::Api(GmailError::Transport(e))) if e.timed_out
        )
    });
    if timed_out {
        return Some(
            "The request timed out. Raise settings.request_timeout_secs in the config file.",
        );
    }
    None
}

/// Truncate to at most `max` bytes on a char boundary, appending "...".
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    // char_indices avoids a mid-codepoint panic
    let end = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max - 3)
        .last()
        .unwrap_or(0);
    format!("{}...", &text[..end])
}
