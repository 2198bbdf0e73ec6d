#![deny(warnings)]

use persistence::default_sqlite_url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    persistence::ensure_db_dir(&url)?;
    let pool = persistence::init_db(&url).await?;
    // Sanity: make sure the default slot exists
    let id = persistence::create_save(&pool, "default", Some("initialized")).await?;
    for save in persistence::list_saves(&pool).await? {
        println!(
            "save {} '{}': {} snapshot(s)",
            save.id, save.name, save.snapshots
        );
    }
    println!("DB migrated at {} (default save {})", url, id);
    Ok(())
}
