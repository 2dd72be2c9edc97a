#![deny(warnings)]

use persistence::{default_sqlite_url, init_db};

/// Creates the database file if needed and applies pending migrations.
/// Usage: `migrate [sqlite-url]`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(parent) = path.and_then(|p| std::path::Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let pool = init_db(&url).await?;
    let (saves,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM player_saves")
        .fetch_one(&pool)
        .await?;
    println!("DB migrated at {url} ({saves} player saves)");
    Ok(())
}
