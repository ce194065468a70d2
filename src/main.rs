mod prompt;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plex_upgrade::auth::{stored_credentials, CredentialStore, Credentials, SavedCredentials};
use plex_upgrade::config::Config;
use plex_upgrade::error::AuthFailure;
use plex_upgrade::reconcile::ReconcileMode;
use plex_upgrade::report::{self, OutcomeReport, MARK_OPTIMAL, MARK_SKIPPED};
use plex_upgrade::service::account::{find_resource, media_servers, ClientIdentity, PlexAccount};
use plex_upgrade::service::plex::PlexServer;
use plex_upgrade::service::Playlist;
use plex_upgrade::spotdl::SpotdlDownloader;
use plex_upgrade::upgrade::{UpgradeOutcome, Upgrader};
use plex_upgrade::Error;

use prompt::PromptChooser;

/// Replace playlist tracks with better versions from the same Plex library
#[derive(Parser, Debug)]
#[command(name = "plex-upgrade")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/plex-upgrade/config.toml)
    #[arg(short, long, value_name = "FILE", env = "PLEX_UPGRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Connect to this server directly instead of choosing an account resource
    #[arg(long, env = "PLEX_SERVER_URL")]
    server_url: Option<String>,

    /// Name of the server resource to use
    #[arg(long)]
    resource: Option<String>,

    /// Upgrade this playlist and exit
    #[arg(short, long)]
    playlist: Option<String>,

    /// Report what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Take the best upgrade for every track without asking
    #[arg(long)]
    simple: bool,

    /// Work on a copy of the playlist
    #[arg(long)]
    duplicate: bool,

    /// Also write the report as JSON
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn flag_mode(&self) -> ReconcileMode {
        ReconcileMode {
            dry_run: self.dry_run,
            simple_replacement: self.simple,
            duplicate: self.duplicate,
        }
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "plex_upgrade=warn",
        1 => "plex_upgrade=info",
        _ => "plex_upgrade=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match args.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let timeout = config.server.timeout()?;
    let identity = ClientIdentity::detect();

    let store = CredentialStore::open_default()?;
    let account = sign_in(&config, &store, identity, timeout).await?;

    let mut server = connect(&args, &config, &account).await?;
    println!("Connected to {}", server.base_url());

    run_session(&args, &config, &mut server).await
}

/// Try a login, asking for a two-factor code when the account needs one
async fn try_sign_in(
    mut credentials: Credentials,
    identity: &ClientIdentity,
    timeout: Duration,
) -> plex_upgrade::Result<PlexAccount> {
    loop {
        match PlexAccount::sign_in(&credentials, identity.clone(), timeout).await {
            Err(Error::Auth(AuthFailure::VerificationCodeRequired))
                if matches!(credentials, Credentials::Password { .. }) =>
            {
                let code = prompt::input("Two-factor verification code")
                    .map_err(|e| Error::Prompt(e.to_string()))?;
                credentials = credentials.with_verification_code(code);
            }
            result => return result,
        }
    }
}

async fn sign_in(
    config: &Config,
    store: &CredentialStore,
    identity: ClientIdentity,
    timeout: Duration,
) -> Result<PlexAccount> {
    let saved = store.load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring saved credentials: {}", e);
        None
    });

    for credentials in stored_credentials(&config.auth, saved.as_ref()) {
        let is_saved_token = matches!(
            (&credentials, &saved),
            (Credentials::Token(token), Some(saved)) if *token == saved.token
        );

        match try_sign_in(credentials, &identity, timeout).await {
            Ok(account) => return Ok(account),
            Err(Error::Auth(failure)) => {
                eprintln!("Login failed: {}", failure);
                if is_saved_token && failure == AuthFailure::InvalidToken {
                    store.clear()?;
                }
            }
            Err(e) => return Err(e).context("Failed to reach plex.tv"),
        }
    }

    loop {
        let credentials = prompt::ask_credentials()?;
        match try_sign_in(credentials, &identity, timeout).await {
            Ok(account) => {
                if prompt::confirm("Save the login token for next time?", true)? {
                    store.save(&SavedCredentials {
                        token: account.token().to_string(),
                        username: account.username().map(str::to_string),
                    })?;
                    println!("Saved to {}", store.path().display());
                }
                return Ok(account);
            }
            Err(Error::Auth(failure)) => eprintln!("Login failed: {}", failure),
            Err(e) => return Err(e).context("Failed to reach plex.tv"),
        }
    }
}

async fn connect(args: &Args, config: &Config, account: &PlexAccount) -> Result<PlexServer> {
    let timeout = config.server.timeout()?;

    if let Some(url) = args.server_url.as_ref().or(config.server.url.as_ref()) {
        return PlexServer::connect(url, account.token(), account.identity().clone(), timeout)
            .await
            .with_context(|| format!("Failed to connect to {}", url));
    }

    let servers = media_servers(account.resources().await?);
    let resource = match args.resource.as_ref().or(config.server.resource.as_ref()) {
        Some(name) => find_resource(&servers, name)?,
        None => match servers.as_slice() {
            [] => bail!(Error::ResourceNotFound(
                "no media servers on this account".to_string()
            )),
            [only] => only,
            _ => {
                let names: Vec<String> = servers.iter().map(|s| s.name.clone()).collect();
                &servers[prompt::select("Select a server", &names, 0)?]
            }
        },
    };

    Ok(account.connect(resource).await?)
}

fn ask_mode(args: &Args) -> Result<ReconcileMode> {
    let mut mode = args.flag_mode();
    if !mode.dry_run {
        mode.dry_run = prompt::confirm("Dry run (report only, change nothing)?", false)?;
    }
    if !mode.simple_replacement {
        mode.simple_replacement =
            prompt::confirm("Replace automatically with the best version?", true)?;
    }
    if !mode.duplicate {
        mode.duplicate = prompt::confirm("Work on a copy of the playlist?", false)?;
    }
    Ok(mode)
}

async fn select_playlist(upgrader: &mut Upgrader<'_, PlexServer>) -> Result<Playlist> {
    let mut playlists = upgrader.playlists().await?;
    if playlists.is_empty() {
        bail!("No playlists that can be upgraded");
    }

    let items: Vec<String> = playlists
        .iter()
        .map(|p| format!("{} ({} tracks)", p.title, p.num_tracks))
        .collect();
    let index = prompt::select("Select a playlist", &items, 0)?;
    Ok(playlists.swap_remove(index))
}

async fn offer_download(downloader: &SpotdlDownloader, outcome: &UpgradeOutcome) -> Result<()> {
    let tracks: Vec<_> = outcome
        .report
        .not_upgraded()
        .map(|t| t.track.clone())
        .collect();
    if tracks.is_empty() {
        return Ok(());
    }
    if !downloader.is_available() {
        tracing::info!("spotdl not found, skipping download offer");
        return Ok(());
    }

    let question = format!(
        "Download the {} tracks that could not be upgraded with spotdl?",
        tracks.len()
    );
    if !prompt::confirm(&question, false)? {
        return Ok(());
    }

    let results = downloader.download(&tracks).await?;
    for result in &results {
        match result.error {
            None => println!("{} {}", MARK_OPTIMAL, result.query),
            Some(ref error) => println!("{} {}: {}", MARK_SKIPPED, result.query, error),
        }
    }
    let downloaded = results.iter().filter(|r| r.is_success()).count();
    println!(
        "Downloaded {} of {} tracks to {}",
        downloaded,
        results.len(),
        downloader.output_dir().display()
    );
    Ok(())
}

async fn run_session(args: &Args, config: &Config, server: &mut PlexServer) -> Result<()> {
    let downloader = SpotdlDownloader::new(&config.spotdl);
    let mut upgrader = Upgrader::new(server, config);
    let mut chooser = PromptChooser;
    let mut incomplete = 0;

    loop {
        let (playlist, mode) = match args.playlist {
            Some(ref title) => (upgrader.playlist_by_title(title).await?, args.flag_mode()),
            None => {
                let playlist = select_playlist(&mut upgrader).await?;
                (playlist, ask_mode(args)?)
            }
        };

        let outcome = upgrader
            .upgrade_playlist(&playlist, mode, &mut chooser)
            .await
            .with_context(|| format!("Upgrading \"{}\" failed", playlist.title))?;

        println!();
        print!("{}", OutcomeReport(&outcome));

        if let Some(ref path) = args.report_json {
            report::write_json(&outcome, path)?;
            println!("Report written to {}", path.display());
        }

        if outcome.commit.as_ref().is_some_and(|c| !c.is_complete()) {
            incomplete += 1;
        }

        if !mode.dry_run {
            offer_download(&downloader, &outcome).await?;
        }

        if args.playlist.is_some() || !prompt::confirm("Upgrade another playlist?", true)? {
            break;
        }
    }

    if incomplete > 0 {
        bail!("{} playlist(s) were only partially updated", incomplete);
    }
    Ok(())
}
