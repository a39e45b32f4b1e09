use neo4rs::{query, ConfigBuilder, Graph};
use tracing::info;

use followgraph_common::Config;

/// Bolt rows pulled per round trip. Degree listings return one row per stub.
const FETCH_SIZE: usize = 500;

/// A crawler holds one expansion at a time; a few connections cover the
/// reads and writes it interleaves.
const MAX_CONNECTIONS: usize = 4;

/// Shared handle to the Neo4j instance holding the follower graph.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(FETCH_SIZE)
            .max_connections(MAX_CONNECTIONS)
            .build()?;
        let graph = Graph::connect(config).await?;
        info!(uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    pub async fn from_config(config: &Config) -> Result<Self, neo4rs::Error> {
        Self::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await
    }

    /// Round-trip a trivial query. Fails if the server is unreachable or the
    /// credentials were rejected.
    pub async fn ping(&self) -> Result<(), neo4rs::Error> {
        let mut stream = self.graph.execute(query("RETURN 1 AS ping")).await?;
        while stream.next().await?.is_some() {}
        Ok(())
    }

    /// Raw driver access for ad-hoc queries in tests and tooling.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
