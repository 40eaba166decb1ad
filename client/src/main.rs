//! FitSync agent - runs a sync session for one user against a local SQLite
//! store and logs sync status changes until interrupted.

use std::sync::Arc;

use fitsync_client::{
    telemetry, Config, InMemoryRemote, SqliteLocalStore, SyncClient, UserIdentity,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let (uid, email) = config.identity()?;

    tracing::info!("Opening local store at {}", config.database_url);
    let local = SqliteLocalStore::connect(&config.database_url).await?;

    // No hosted backend is wired in; an in-process store stands in for it
    let remote = Arc::new(InMemoryRemote::new());

    let client = SyncClient::new(Arc::new(local.clone()), remote, config.session.clone());
    let session = client.sign_in(UserIdentity::new(uid, email)).await;

    let mut status = session.watch_status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                let gateway = session.gateway();
                tracing::info!(
                    status = %current,
                    routines = gateway.routines().len(),
                    workout_logs = gateway.workout_logs().len(),
                    chat_messages = gateway.chat_log().len(),
                    meal_plan_days = gateway.meal_plan().len(),
                    "Sync status changed"
                );
            }
        }
    }

    tracing::info!("Shutting down");
    client.sign_out().await;
    local.close().await;

    Ok(())
}
