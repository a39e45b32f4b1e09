use neo4rs::query;
use tracing::{info, warn};

use crate::GraphClient;

/// Create the identity indexes if they are missing. Safe to run on every start.
///
/// `user_id` is a uniqueness constraint: it doubles as the lookup index and is
/// what turns a racing duplicate stub insert into a detectable conflict.
/// `screen_name` is a plain index because labels can be reassigned upstream.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = &client.graph;

    info!("Running schema migrations...");

    let constraints = [
        "CREATE CONSTRAINT user_id IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
    ];
    for c in &constraints {
        run_ignoring_exists(g, c).await?;
    }
    info!("user_id constraint OK");

    let indexes = [
        "CREATE INDEX screen_name IF NOT EXISTS FOR (u:User) ON (u.screen_name)",
        "CREATE INDEX user_detail IF NOT EXISTS FOR (u:User) ON (u.detail)",
    ];
    for idx in &indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("screen_name index OK");

    Ok(())
}

/// Run a schema statement, tolerating servers that reject duplicates instead
/// of honouring `IF NOT EXISTS`.
async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
