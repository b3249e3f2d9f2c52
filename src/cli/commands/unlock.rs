use anyhow::{Context, Result, bail};

use crate::config::Config;
use crate::db::Store;
use crate::domain::Actor;

/// Administrative unlock: the only way out of a permanent lock.
pub async fn execute(config: &Config, user_id: &str) -> Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let repo = store.users(&config.security);

    let normalized = user_id.trim().to_uppercase();
    let Some(user) = repo
        .find(&normalized)
        .await
        .context("Failed to look up user")?
    else {
        bail!("No user with id {normalized}");
    };

    if !user.permanent_lock && user.failed_login_attempts == 0 {
        println!("Account {normalized} is not locked.");
        return Ok(());
    }

    let was_permanent = user.permanent_lock;
    repo.admin_unlock(user, &Actor::System)
        .await
        .context("Failed to unlock account")?;

    if was_permanent {
        println!("Cleared permanent lock on {normalized}.");
    } else {
        println!("Reset failure counters on {normalized}.");
    }

    Ok(())
}
