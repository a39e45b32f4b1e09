//! Disposable Neo4j for store tests, via testcontainers.

use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::migrate::migrate;
use crate::{GraphClient, UserStore};

const NEO4J_IMAGE: &str = "neo4j";
const NEO4J_TAG: &str = "5.25.1";
const BOLT_PORT: u16 = 7687;
const TEST_PASSWORD: &str = "testpassword";

/// Start a community Neo4j and connect to it. Keep the returned container
/// alive for the whole test; dropping it stops the server.
pub async fn neo4j_container() -> (ContainerAsync<GenericImage>, GraphClient) {
    let container = GenericImage::new(NEO4J_IMAGE, NEO4J_TAG)
        .with_exposed_port(ContainerPort::Tcp(BOLT_PORT))
        .with_wait_for(WaitFor::message_on_stdout("Started."))
        .with_env_var("NEO4J_AUTH", format!("neo4j/{TEST_PASSWORD}"))
        .start()
        .await
        .expect("Failed to start Neo4j container");

    let port = container
        .get_host_port_ipv4(BOLT_PORT)
        .await
        .expect("Failed to get Neo4j host port");

    let client = GraphClient::connect(&format!("bolt://127.0.0.1:{port}"), "neo4j", TEST_PASSWORD)
        .await
        .expect("Failed to connect to Neo4j");

    (container, client)
}

/// `neo4j_container` plus the schema applied and a `UserStore` on top.
pub async fn migrated_store() -> (ContainerAsync<GenericImage>, GraphClient, UserStore) {
    let (container, client) = neo4j_container().await;
    migrate(&client).await.expect("migration failed");
    let store = UserStore::new(client.clone());
    (container, client, store)
}
