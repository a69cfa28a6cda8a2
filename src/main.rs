use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fieldaudit::cache::{CacheStore, ResourceCache};
use fieldaudit::config::Config;
use fieldaudit::net::HttpFetcher;
use fieldaudit::session::{LoginCredentials, NewUser, SessionManager};
use fieldaudit::store::{SnapshotStore, SqliteStore};
use fieldaudit::sync::{flush_audit_mutations, SyncCoordinator, SYNC_AUDIT_DATA};

#[derive(Parser, Debug)]
#[command(name = "fieldaudit")]
#[command(about = "Offline-first session and cache core for a field audit client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fieldaudit/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the current session state
  Status,
  /// Create a new auditor account (password from FIELDAUDIT_PASSWORD)
  Register {
    #[arg(short, long)]
    username: String,
    #[arg(short, long)]
    name: String,
    #[arg(short, long)]
    email: Option<String>,
  },
  /// Sign in and persist the session (password from FIELDAUDIT_PASSWORD)
  Login {
    #[arg(short, long)]
    username: String,
  },
  /// Clear the current session
  Logout,
  /// Resource cache lifecycle
  #[command(subcommand)]
  Cache(CacheCommand),
  /// Signal connectivity regained and flush queued audit mutations
  Online,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Download the manifest into the current generation
  Install,
  /// Delete every generation other than the current one
  Activate,
  /// Show the current generation and what is stored
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let store = Arc::new(SqliteStore::open(&config.records_db_path()?)?);
  let sessions = SessionManager::new(
    Arc::clone(&store),
    SnapshotStore::new(config.snapshot_path()?),
  );
  sessions.initialize().await;

  match args.command {
    Command::Status => {
      let state = sessions.state();
      match state.user {
        Some(user) => println!(
          "signed in as {} ({}, {})",
          user.username,
          user.name,
          user.role.as_str()
        ),
        None => println!("signed out"),
      }
    }

    Command::Register {
      username,
      name,
      email,
    } => {
      let password = Config::password_from_env()?;
      match sessions
        .register(NewUser {
          username,
          password,
          name,
          email,
        })
        .await
      {
        Ok(user) => println!("created account {} ({})", user.username, user.id),
        Err(err) => println!("registration failed: {}", err),
      }
    }

    Command::Login { username } => {
      let password = Config::password_from_env()?;
      match sessions
        .login(&LoginCredentials { username, password })
        .await
      {
        Ok(()) => {
          if let Some(user) = sessions.state().user {
            println!("signed in as {}", user.username);
          }
        }
        Err(err) => println!("login failed: {}", err),
      }
    }

    Command::Logout => {
      sessions.logout().await;
      println!("signed out");
    }

    Command::Cache(command) => {
      let cache_store = Arc::new(CacheStore::open(&config.cache_db_path()?)?);
      let cache = ResourceCache::new(Arc::clone(&cache_store), config.manifest());

      match command {
        CacheCommand::Install => {
          let fetcher = HttpFetcher::new(&config.base_url)?;
          cache
            .install(|url: &str| {
              let fetcher = fetcher.clone();
              let url = url.to_string();
              async move { fetcher.fetch(&url).await }
            })
            .await?;
          println!(
            "installed {} resources under generation {}",
            cache.manifest().len(),
            cache.generation()
          );
        }
        CacheCommand::Activate => {
          let removed = cache.activate()?;
          println!(
            "generation {} active, removed {} old generation(s)",
            cache.generation(),
            removed.len()
          );
        }
        CacheCommand::Status => {
          println!("current generation: {}", cache.generation());
          for label in cache_store.generations()? {
            println!("  stored: {}", label);
          }
        }
      }
    }

    Command::Online => {
      let coordinator = SyncCoordinator::new(Arc::clone(&store));

      // Model the host: work queued while offline registers the task
      if !store.pending_mutations()?.is_empty() {
        coordinator.request(SYNC_AUDIT_DATA)?;
      }

      let flush_store = Arc::clone(&store);
      let ran = coordinator
        .connectivity_regained(SYNC_AUDIT_DATA, || async move {
          flush_audit_mutations(&flush_store, |batch| async move {
            info!(mutations = batch.len(), "delivering queued audit mutations");
            Ok(())
          })
          .await
        })
        .await?;

      if ran {
        println!("audit data synced");
      } else {
        println!("nothing to sync");
      }
    }
  }

  Ok(())
}
