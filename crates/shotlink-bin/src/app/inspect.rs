//! Offline inspection of the producer database.

use shotlink_config_and_utils::Paths;
use shotlink_database::AsyncDatabase;
use shotlink_outbox::BacklogStore;

/// Print every backlog entry as a JSON array on stdout.
pub async fn print_backlog(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = paths.producer_database_file();
    if !db_path.exists() {
        println!("[]");
        return Ok(());
    }

    let db = AsyncDatabase::open(&db_path).await?;
    let entries = BacklogStore::new(db).list().await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
