//! Subcommand handlers.

use crate::prompt::TerminalPrompt;
use crate::{AuthAction, Commands, ConfigAction};
use chrono::Utc;
use runbox_core::auth::{CredentialStatus, ProfileContext, TokenResolver};
use runbox_core::config::{AuthProfileRef, RunboxConfig, load_config, workspace_config_path};
use runbox_core::oauth::{OAuthClient, open_in_browser};
use runbox_core::store_login;
use runbox_tools::sandbox_registry;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(workspace))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match command {
        Commands::Auth { action } => handle_auth(action, &config, workspace).await,
        Commands::Tools { json } => handle_tools(&config, json),
        Commands::Call {
            tool,
            args,
            call_id,
            json,
        } => handle_call(&config, &tool, &args, call_id, json).await,
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

async fn handle_auth(
    action: AuthAction,
    config: &RunboxConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    let service = &config.service;
    match action {
        AuthAction::Login { remote } => {
            let agent_dir = config.resolved_agent_dir().ok_or_else(|| {
                anyhow::anyhow!("Cannot determine an agent directory; set `agent_dir` in config")
            })?;

            println!("Starting OAuth login for {}...", service.provider_id);
            println!("Redirect URI: {}", service.redirect_uri());
            if !remote {
                println!("Opening your browser for authentication...");
            }
            println!();

            let client = OAuthClient::new(service.clone())?;
            let credentials = client
                .run_flow(remote, &open_in_browser, &TerminalPrompt)
                .await
                .map_err(|e| anyhow::anyhow!("OAuth login failed: {}", e))?;

            let profile_id = store_login(&agent_dir, &service.provider_id, &credentials)
                .map_err(|e| anyhow::anyhow!("Failed to store credentials: {}", e))?;
            let config_path = runbox_core::config::upsert_profile_config(
                workspace,
                &profile_id,
                AuthProfileRef {
                    provider: service.provider_id.clone(),
                    email: credentials.email.clone(),
                },
            )?;

            println!("Successfully authenticated as profile '{}'.", profile_id);
            let remaining = credentials
                .expires_at
                .saturating_sub(Utc::now().timestamp_millis());
            println!("  Access token expires in {}", format_remaining(remaining));
            if credentials.api_key.is_some() {
                println!("  A permanent API key was issued and stored.");
            }
            println!("  Profile recorded in {}", config_path.display());
            Ok(())
        }
        AuthAction::Status => {
            let resolver = TokenResolver::new(OAuthClient::new(service.clone())?);
            let ctx = ProfileContext::from_config(config);

            println!("Authentication status ({}):", service.provider_id);
            match resolver.inspect(&ctx) {
                Ok(status) => println!("  {}", describe_status(&status)),
                Err(e) => println!("  not ready: {}", e),
            }
            if let Some(dir) = &ctx.agent_dir {
                println!(
                    "  Credential store: {}",
                    runbox_core::AuthProfileStore::path_in(dir).display()
                );
            }
            Ok(())
        }
        AuthAction::Refresh => {
            let resolver = TokenResolver::new(OAuthClient::new(service.clone())?);
            let ctx = ProfileContext::from_config(config);
            let status = resolver
                .inspect(&ctx)
                .map_err(|e| anyhow::anyhow!("Refresh failed: {}", e))?;
            if let CredentialStatus::Environment { var } = status {
                anyhow::bail!("Token is supplied by ${var}; nothing to refresh");
            }

            resolver
                .force_refresh(&ctx)
                .await
                .map_err(|e| anyhow::anyhow!("Refresh failed: {}", e))?;
            let status = resolver.inspect(&ctx)?;
            println!("Token refreshed. {}", describe_status(&status));
            Ok(())
        }
    }
}

fn handle_tools(config: &RunboxConfig, json: bool) -> anyhow::Result<()> {
    let registry = sandbox_registry(config)?;
    let definitions = registry.list_definitions();

    if json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    for def in definitions {
        println!("{} [{}]", def.name, def.risk_level);
        println!("    {}", def.description);
        if let Some(props) = def.parameters["properties"].as_object() {
            let required: Vec<&str> = def.parameters["required"]
                .as_array()
                .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            for name in props.keys() {
                let marker = if required.contains(&name.as_str()) { "*" } else { " " };
                println!("    {marker} {name}");
            }
        }
    }
    Ok(())
}

async fn handle_call(
    config: &RunboxConfig,
    tool: &str,
    args: &str,
    call_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let args: serde_json::Value = serde_json::from_str(args)
        .map_err(|e| anyhow::anyhow!("Arguments must be a JSON object: {}", e))?;
    if !args.is_object() {
        anyhow::bail!("Arguments must be a JSON object");
    }

    let call_id = call_id.unwrap_or_else(|| format!("cli-{}", Utc::now().timestamp_millis()));
    let registry = sandbox_registry(config)?;
    let output = registry.execute(tool, &call_id, args).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.text_content());
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    config: &RunboxConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Path => {
            if let Some(dirs) = directories::ProjectDirs::from("dev", "runbox", "runbox") {
                println!("User config:      {}", dirs.config_dir().join("config.toml").display());
            }
            println!("Workspace config: {}", workspace_config_path(workspace).display());
            if let Some(dir) = config.resolved_agent_dir() {
                println!("Agent directory:  {}", dir.display());
            }
        }
    }
    Ok(())
}

fn describe_status(status: &CredentialStatus) -> String {
    let now = Utc::now().timestamp_millis();
    match status {
        CredentialStatus::Environment { var } => format!("using token from ${var}"),
        CredentialStatus::ApiKey { profile_id } => {
            format!("{profile_id}: permanent API key")
        }
        CredentialStatus::Valid {
            profile_id,
            expires_at,
        } => format!(
            "{profile_id}: access token valid, expires in {}",
            format_remaining(expires_at.saturating_sub(now))
        ),
        CredentialStatus::NeedsRefresh { profile_id, .. } => {
            format!("{profile_id}: access token expired, will refresh on next use")
        }
        CredentialStatus::Expired { profile_id } => {
            format!("{profile_id}: all tokens expired, run `runbox auth login`")
        }
    }
}

fn format_remaining(ms: i64) -> String {
    let secs = (ms / 1000).max(0);
    match secs {
        s if s >= 3600 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s if s >= 60 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{s}s"),
    }
}
