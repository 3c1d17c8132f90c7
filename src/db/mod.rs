use log::{error, info, warn};
use mongodb::Client;
use rocket::fairing::AdHoc;
use std::sync::Arc;

use crate::config::Config;
use crate::store::{MemoryStore, MongoStore, Store};

/// Managed handle every route borrows through `&State<DbConn>`.
pub type DbConn = Arc<dyn Store>;

pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Storage", |rocket| async {
        if Config::storage() == "memory" {
            warn!("Using in-memory storage, data is lost on restart");
            let store: DbConn = Arc::new(MemoryStore::new());
            return Ok(rocket.manage(store));
        }

        match connect().await {
            Ok(store) => {
                info!("✓ MongoDB connected successfully");
                Ok(rocket.manage(store))
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                Err(rocket)
            }
        }
    })
}

async fn connect() -> Result<DbConn, Box<dyn std::error::Error + Send + Sync>> {
    let uri = Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(mongodb::bson::doc! {"ping": 1}, None)
        .await?;

    let store = MongoStore::new(client.database(&Config::database_name()));
    store.ensure_indexes().await?;
    Ok(Arc::new(store))
}
