mod oracle;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use ghost_core::{ChatSession, CoreConfig};
use ghost_local::LocalDb;
use ghost_store::{Clock, MemoryStore, SystemClock};
use ghost_types::{ClientEvent, IdentityId, Profile};

use crate::oracle::Oracle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging. stdout belongs to the chat.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ghost=debug,ghost_core=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let config = CoreConfig::from_env();
    let db_path = std::env::var("GHOST_STATE_DB").unwrap_or_else(|_| "ghost.db".into());

    // Local state
    let local = Arc::new(LocalDb::open(&PathBuf::from(&db_path))?);
    let profile = match local.load_profile()? {
        Some(profile) => profile,
        None => {
            let name = std::env::var("GHOST_NAME").unwrap_or_default();
            let color = std::env::var("GHOST_COLOR").unwrap_or_default();
            let id = IdentityId::new(uuid::Uuid::new_v4().simple().to_string());
            let profile = Profile::new(id, &name, &color, &mut rand::rng());
            local.save_profile(&profile)?;
            info!(identity = %profile.id, name = %profile.name, "new profile created");
            profile
        }
    };

    // Loopback store: everything stays in this process.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(clock.clone()));

    let oracle = match std::env::var("GHOST_GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            let models = std::env::var("GHOST_GEMINI_MODELS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            Oracle::gemini(key.trim().to_string(), models)
        }
        _ => Oracle::Offline,
    };

    let session = ChatSession::new(store, Arc::new(oracle), local, profile, config, clock);
    session.start();
    info!(identity = %session.profile().id, db = %db_path, "ghost client ready");

    let printer = tokio::spawn(repl::print_updates(session.clone()));
    let mut events = session.events();
    tokio::select! {
        result = repl::run(session.clone()) => result?,
        _ = async {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::Banished { .. }) | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                }
            }
        } => {
            // Let the printer show the banishment first.
            tokio::task::yield_now().await;
        }
    }

    printer.abort();
    session.shutdown().await;
    Ok(())
}
