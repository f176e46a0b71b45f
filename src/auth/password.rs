use anyhow::Context;
use tokio::sync::OnceCell;

/// Stand-in hash checked when the username is unknown, so a miss costs as
/// much as a wrong password.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Hashes on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")?
        .context("failed to verify password")
}

/// Runs a full bcrypt verification that always fails.
pub async fn verify_dummy(password: String, cost: u32) -> anyhow::Result<bool> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| hash_password(super::random_hex(16), cost))
        .await?
        .clone();
    verify_password(password, hash).await?;
    Ok(false)
}
