use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use shaddy_bot::auth::AccessGate;
use shaddy_bot::bot::Bot;
use shaddy_bot::config::Config;
use shaddy_bot::keys::conversation::Provisioner;
use shaddy_bot::keys::store::{CredentialStore, FileStore};
use shaddy_bot::outline::OutlineClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let store: Arc<dyn CredentialStore> = Arc::new(FileStore::new(&config.database_path));
    // Fail fast on an unreadable or corrupt credential database.
    store.list_all().await?;

    let gate = AccessGate::new(config.admin_id);
    let outline = OutlineClient::new(&config)?;
    let provisioner = Provisioner::new(store.clone(), outline, gate);
    let bot = Bot::new(config, store, gate, provisioner)?;

    bot.run().await?;
    Ok(())
}
