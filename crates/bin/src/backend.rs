//! Engine creation and persistence.

use std::path::{Path, PathBuf};

use livetree::{Store, backend::database::InMemory};

use crate::cli::ServeArgs;

/// File inside the data directory holding the persisted store.
pub const DB_FILE: &str = "livetree.json";

/// Where the store is persisted for the given arguments.
pub fn db_path(args: &ServeArgs) -> PathBuf {
    args.data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DB_FILE)
}

/// Open the store, loading previously saved data when present.
pub async fn open_store(json_path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if let Some(data_dir) = json_path.parent() {
        // Ensure data directory exists
        tokio::fs::create_dir_all(data_dir).await?;
    }

    tracing::info!(
        "Using in-memory engine with persistence at {}",
        json_path.display()
    );
    // A missing file loads as an empty engine; anything else is an error so a
    // corrupt file is never overwritten on shutdown.
    let backend = InMemory::load_from_file(json_path).await?;
    tracing::info!("Loaded {} leaves", backend.len().await);
    Ok(Store::new(Box::new(backend)))
}

/// Persist the store if its engine is the in-memory one.
pub async fn save_store(store: &Store, json_path: &Path) {
    let Some(in_memory) = store.backend().as_any().downcast_ref::<InMemory>() else {
        return;
    };
    match in_memory.save_to_file(json_path).await {
        Ok(()) => {
            tracing::info!("Database saved to {}", json_path.display());
            println!("\nDatabase saved successfully");
        }
        Err(e) => {
            tracing::error!("Failed to save database: {e:?}");
            eprintln!("Failed to save database: {e:?}");
        }
    }
}
