//! drive_uploader CLI - Upload files and folders to Google Drive.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drive_uploader::flow::{self, DEFAULT_AUTH_TIMEOUT, DEFAULT_CALLBACK_PORT};
use drive_uploader::token;
use drive_uploader::{
    AuthStrategy, Authenticator, Config, DriveClient, DriveError, OAuthClient, TreeUploader,
    UploadTarget,
};

/// How long an interrupted command may take to wind down.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// How long runtime shutdown waits for leftover tasks.
///
/// A timed-out or cancelled code prompt leaves a stdin read blocked on its
/// worker thread; it is abandoned rather than waited for.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// CLI tool for uploading files and directory trees to Google Drive.
#[derive(Parser)]
#[command(name = "drive_uploader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding credentials and token (default: user config dir).
    #[arg(long, env = "DRIVE_UPLOADER_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Path to the OAuth client secrets JSON file.
    #[arg(long, env = "DRIVE_UPLOADER_CREDENTIALS", global = true)]
    credentials: Option<PathBuf>,

    /// Path to the saved OAuth token.
    #[arg(long, env = "TOKEN_FILE_PATH", global = true)]
    token: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored Google authorization.
    Auth {
        #[command(subcommand)]
        action: AuthCommand,
    },

    /// Upload a file, or a directory with everything in it.
    Upload {
        /// Local file or directory.
        path: PathBuf,

        /// Destination folder URL or ID (default: My Drive root).
        #[arg(long, short = 'p')]
        parent: Option<String>,

        #[command(flatten)]
        login: LoginArgs,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Authorize this tool and save the token.
    Login {
        /// Overwrite an existing token without asking.
        #[arg(long, short = 'f')]
        force: bool,

        #[command(flatten)]
        login: LoginArgs,
    },

    /// Delete the saved token.
    Logout,

    /// Show whether a token is saved and where.
    #[command(alias = "list")]
    Status,
}

/// Options for the interactive authorization.
#[derive(Args)]
struct LoginArgs {
    /// Paste the authorization code instead of running a local listener.
    #[arg(long)]
    manual: bool,

    /// Port for the local callback listener.
    #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
    port: u16,

    /// Seconds to wait for the authorization to complete.
    #[arg(long, default_value_t = DEFAULT_AUTH_TIMEOUT.as_secs())]
    timeout: u64,

    /// Do not try to open a browser.
    #[arg(long)]
    no_browser: bool,
}

impl LoginArgs {
    fn strategy(&self) -> AuthStrategy {
        if self.manual {
            AuthStrategy::Manual
        } else {
            AuthStrategy::LocalCallback {
                port: self.port,
                open_browser: !self.no_browser,
            }
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    block_on(async_main(cli))?
}

/// Run `future` to completion on a fresh runtime, then shut the runtime
/// down without waiting on blocked reads.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    Ok(output)
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config_dir, cli.credentials, cli.token)
        .context("Failed to resolve configuration")?;
    config
        .ensure_config_dir()
        .with_context(|| format!("Failed to create config directory {:?}", config.config_dir))?;

    let cancel = CancellationToken::new();
    let command = run(cli.command, &config, &cancel);
    tokio::pin!(command);

    tokio::select! {
        result = &mut command => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            // Give a pending authorization the chance to stop its listener.
            match tokio::time::timeout(INTERRUPT_GRACE, command).await {
                Ok(result) => result,
                Err(_) => anyhow::bail!("Interrupted"),
            }
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "info,drive_uploader=debug"
    } else {
        "warn,drive_uploader=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(command: Commands, config: &Config, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Auth { action } => match action {
            AuthCommand::Login { force, login } => cmd_login(config, force, &login, cancel).await,
            AuthCommand::Logout => cmd_logout(config),
            AuthCommand::Status => cmd_status(config),
        },
        Commands::Upload {
            path,
            parent,
            login,
        } => cmd_upload(config, path, parent, &login, cancel).await,
    }
}

fn load_oauth(config: &Config) -> Result<OAuthClient> {
    OAuthClient::from_file(&config.credentials_path).with_context(|| {
        format!(
            "Failed to load OAuth client credentials from {:?}. Download them from \
             https://console.cloud.google.com/apis/credentials (OAuth 2.0 Client ID, \
             Desktop app) and save the file there or pass --credentials",
            config.credentials_path
        )
    })
}

async fn cmd_login(
    config: &Config,
    force: bool,
    login: &LoginArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    if config.token_path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "A token already exists at {}. Overwrite it?",
                config.token_path.display()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !overwrite {
            println!("Keeping the existing token.");
            return Ok(());
        }
    }

    let oauth = load_oauth(config)?;
    flow::login(
        &oauth,
        &login.strategy(),
        &config.token_path,
        cancel,
        login.timeout(),
    )
    .await
    .context("Authorization failed")?;

    println!("Authentication successful.");
    println!("Token file: {}", config.token_path.display());
    Ok(())
}

fn cmd_logout(config: &Config) -> Result<()> {
    let removed = token::delete_token(&config.token_path)
        .with_context(|| format!("Failed to delete token file {:?}", config.token_path))?;

    if removed {
        println!("Logged out. Removed {}", config.token_path.display());
    } else {
        println!("Not logged in (no token at {}).", config.token_path.display());
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    match token::load_token(&config.token_path) {
        Ok(token) => {
            println!("Status:      authenticated");
            println!("Token file:  {}", config.token_path.display());
            match token.expiry {
                Some(expiry) if token.is_expired() => {
                    println!("Expires:     {} (expired, renewed on next use)", expiry.to_rfc3339())
                }
                Some(expiry) => println!("Expires:     {}", expiry.to_rfc3339()),
                None => println!("Expires:     never"),
            }
            let refresh = if token.refresh_token.is_some() { "yes" } else { "no" };
            println!("Refreshable: {}", refresh);
        }
        Err(DriveError::TokenNotFound(path)) => {
            println!("Status:      not authenticated");
            println!("Token file:  {} (not found)", path.display());
            println!("Run `drive_uploader auth login` to authenticate.");
        }
        Err(e @ DriveError::TokenMalformed { .. }) => {
            tracing::warn!("{}", e);
            println!("Status:      not authenticated (token file unreadable)");
            println!("Token file:  {}", config.token_path.display());
            println!("Run `drive_uploader auth login` to authenticate again.");
        }
        Err(e) => return Err(e).context("Failed to read token"),
    }

    println!("Credentials: {}", config.credentials_path.display());
    Ok(())
}

/// Build a Drive client, running the interactive login once if no usable
/// token is saved.
async fn connect(config: &Config, login: &LoginArgs, cancel: &CancellationToken) -> Result<DriveClient> {
    let err = match DriveClient::from_config(config) {
        Ok(client) => return Ok(client),
        Err(e) if e.needs_login() => e,
        Err(e) => return Err(e).context("Failed to create Drive client"),
    };

    match err {
        DriveError::TokenMalformed { .. } => tracing::warn!("{}; authorizing again", err),
        _ => tracing::info!("Token not found, starting authorization"),
    }

    let oauth = load_oauth(config)?;
    let token = flow::login(
        &oauth,
        &login.strategy(),
        &config.token_path,
        cancel,
        login.timeout(),
    )
    .await
    .context("Authorization failed")?;

    let auth = Authenticator::new(oauth, token).with_token_path(config.token_path.clone());
    Ok(DriveClient::new(auth))
}

async fn cmd_upload(
    config: &Config,
    path: PathBuf,
    parent: Option<String>,
    login: &LoginArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut target = UploadTarget::new(path);
    if let Some(parent) = parent {
        target = target
            .with_parent(&parent)
            .with_context(|| format!("Invalid destination folder: {}", parent))?;
    }

    // Fail on a bad path before any authorization or API call.
    if !target.local_path().exists() {
        return Err(DriveError::PathNotFound(target.local_path().to_path_buf()).into());
    }

    let client = connect(config, login, cancel).await?;

    println!("Uploading {}...", target.local_path().display());
    let summary = TreeUploader::new(&client)
        .upload_path(&target)
        .await
        .with_context(|| format!("Failed to upload {}", target.local_path().display()))?;

    if let Some(link) = &summary.web_view_link {
        println!("View online: {}", link);
    }
    println!(
        "Done. {} file(s) uploaded, {} folder(s) resolved.",
        summary.files, summary.folders
    );
    Ok(())
}
