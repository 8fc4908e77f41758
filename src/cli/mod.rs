//! Command-line interface for the gallery client.
//!
//! Subcommands for talking to a running gallery service:
//! - `login` / `register` - Authenticate and store the session token
//! - `logout` - Clear the session
//! - `status` - Show session and gallery summary
//! - `images list` - List uploaded images
//! - `images upload <path>` - Upload an image file
//! - `images delete <filename>` - Delete an image

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{BearerAttacher, CookieAttacher, CredentialAttacher, HttpGalleryApi, ImageUpload};
use crate::config::{AuthScheme, Config};
use crate::controller::{GalleryController, GallerySnapshot};
use crate::credentials::FileCredentialStore;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "picshelf")]
#[command(author, version, about = "A command-line client for a self-hosted image gallery service", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "picshelf.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Gallery service URL (overrides the config file)
    #[arg(long, env = "PICSHELF_API_URL")]
    pub api_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the session token
    Login { username: String, password: String },

    /// Create an account and log in
    Register { username: String, password: String },

    /// Clear the stored session
    Logout,

    /// Show session and gallery status
    Status,

    /// Gallery commands
    #[command(subcommand)]
    Images(ImagesCommands),
}

/// Images subcommands
#[derive(Subcommand, Debug)]
pub enum ImagesCommands {
    /// List uploaded images
    List,
    /// Upload an image file
    Upload {
        /// Path to the image file
        path: PathBuf,
    },
    /// Delete an image by its server-assigned filename
    Delete {
        /// Server-assigned filename (see `images list`)
        filename: String,
    },
}

/// Build the controller from configuration and CLI overrides.
fn build_controller(cli: &Cli, config: &Config) -> Result<GalleryController> {
    let base_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| config.api.base_url.clone());

    let attacher: Box<dyn CredentialAttacher> = match config.api.auth_scheme {
        AuthScheme::Bearer => Box::new(BearerAttacher),
        AuthScheme::Cookie => Box::new(CookieAttacher::new(config.api.cookie_name.clone())),
    };

    let api = HttpGalleryApi::new(
        base_url,
        Duration::from_secs(config.api.timeout_secs),
        attacher,
    )
    .context("Failed to create HTTP client")?;
    let store = FileCredentialStore::new(config.credentials.token_file.clone());

    Ok(GalleryController::new(Arc::new(api), Arc::new(store)))
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    let controller = build_controller(cli, config)?;
    match &cli.command {
        Commands::Login { username, password } => cmd_login(&controller, username, password).await,
        Commands::Register { username, password } => {
            cmd_register(&controller, username, password).await
        }
        Commands::Logout => cmd_logout(&controller).await,
        Commands::Status => cmd_status(cli, config, &controller).await,
        Commands::Images(ImagesCommands::List) => cmd_images_list(&controller).await,
        Commands::Images(ImagesCommands::Upload { path }) => {
            cmd_images_upload(&controller, path).await
        }
        Commands::Images(ImagesCommands::Delete { filename }) => {
            cmd_images_delete(&controller, filename).await
        }
    }
}

async fn cmd_login(controller: &GalleryController, username: &str, password: &str) -> Result<()> {
    controller.login(username, password).await?;
    let snapshot = controller.snapshot();
    println!(
        "Logged in as {} ({} images in your gallery).",
        snapshot.session.username.as_deref().unwrap_or(username),
        snapshot.images.len()
    );
    Ok(())
}

async fn cmd_register(
    controller: &GalleryController,
    username: &str,
    password: &str,
) -> Result<()> {
    controller.register(username, password).await?;
    println!("Account created. Logged in as {}.", username);
    Ok(())
}

async fn cmd_logout(controller: &GalleryController) -> Result<()> {
    // Restore the session first so the server can be notified
    let _ = controller.initialize().await;
    controller.logout().await;
    println!("Logged out.");
    Ok(())
}

async fn cmd_status(cli: &Cli, config: &Config, controller: &GalleryController) -> Result<()> {
    let init_result = controller.initialize().await;
    let snapshot = controller.snapshot();

    let base_url = cli.api_url.as_ref().unwrap_or(&config.api.base_url);
    println!();
    println!("=== Picshelf Status ===");
    println!();
    println!("Server:     {}", base_url);
    if snapshot.session.is_authenticated() {
        println!(
            "Session:    [OK] logged in as {}",
            snapshot.session.username.as_deref().unwrap_or("?")
        );
        println!("Images:     {}", snapshot.images.len());
    } else {
        println!("Session:    [--] not logged in");
        if let Err(err) = init_result {
            println!("            ({})", err);
        }
    }
    println!();
    Ok(())
}

async fn cmd_images_list(controller: &GalleryController) -> Result<()> {
    let snapshot = require_session(controller).await?;

    if snapshot.images.is_empty() {
        println!("Your gallery is empty.");
        return Ok(());
    }

    println!();
    println!("{:<40}  {:<30}  {:<16}", "FILENAME", "ORIGINAL", "UPLOADED");
    println!("{}", "-".repeat(90));
    for record in &snapshot.images {
        println!(
            "{:<40}  {:<30}  {:<16}",
            truncate(&record.filename, 40),
            truncate(&record.original_filename, 30),
            record.upload_date.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

async fn cmd_images_upload(controller: &GalleryController, path: &Path) -> Result<()> {
    require_session(controller).await?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file path: {}", path.display()))?
        .to_string();
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let record = controller
        .upload_image(ImageUpload::new(data, filename))
        .await?;
    println!(
        "Uploaded {} as {}.",
        record.original_filename, record.filename
    );
    Ok(())
}

async fn cmd_images_delete(controller: &GalleryController, filename: &str) -> Result<()> {
    require_session(controller).await?;
    controller.delete_image(filename).await?;
    println!("Deleted {}.", filename);
    Ok(())
}

/// Restore the persisted session, bailing with a hint when there is none.
async fn require_session(controller: &GalleryController) -> Result<GallerySnapshot> {
    let _ = controller.initialize().await;
    let snapshot = controller.snapshot();
    if !snapshot.session.is_authenticated() {
        match snapshot.error.as_deref() {
            Some(message) => bail!("Not logged in: {}", message),
            None => bail!("Not logged in. Run `picshelf login <username> <password>` first."),
        }
    }
    Ok(snapshot)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
