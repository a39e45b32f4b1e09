use chrono::{DateTime, Utc};
use neo4rs::query;
use tracing::{debug, warn};

use followgraph_common::{ProfileAttributes, UserId, UserRecord};

use crate::reader::row_to_user;
use crate::GraphClient;

/// Outcome of an idempotent follow-edge insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Created,
    AlreadyExists,
    /// One of the endpoints has no `User` node yet.
    MissingEndpoint,
}

/// `User` nodes and `FOLLOWS` relationships in Neo4j. Write side lives here,
/// lookups and degree queries in `reader.rs`.
#[derive(Clone)]
pub struct UserStore {
    pub(crate) client: GraphClient,
}

impl UserStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Create a `basic` record. Returns `None` if a node with this ID already exists.
    pub async fn create_stub(
        &self,
        id: UserId,
        accessed_at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, neo4rs::Error> {
        let q = query(
            "OPTIONAL MATCH (existing:User {id: $id})
             WITH existing WHERE existing IS NULL
             CREATE (u:User {id: $id, detail: 'basic', accessed_at: $accessed_at})
             RETURN u",
        )
        .param("id", id.get())
        .param("accessed_at", format_datetime(&accessed_at));

        self.create_returning(q, id).await
    }

    /// Create a `full` record from a fetched profile. Returns `None` if the ID is taken.
    pub async fn create_full(
        &self,
        profile: &ProfileAttributes,
    ) -> Result<Option<UserRecord>, neo4rs::Error> {
        let q = query(
            "OPTIONAL MATCH (existing:User {id: $id})
             WITH existing WHERE existing IS NULL
             CREATE (u:User {
                 id: $id,
                 screen_name: $screen_name,
                 detail: 'full',
                 accessed_at: $accessed_at,
                 profile_json: $profile_json
             })
             RETURN u",
        )
        .param("id", profile.id.get())
        .param("screen_name", profile.screen_name.as_str())
        .param("accessed_at", format_datetime(&profile.accessed_at))
        .param("profile_json", profile_json(profile));

        self.create_returning(q, profile.id).await
    }

    /// Overwrite a `basic` record with profile data and mark it `full`.
    /// Returns `None` when there is no `basic` node with this ID (missing or
    /// already promoted); the `detail` guard keeps promotion one-way.
    pub async fn promote(
        &self,
        profile: &ProfileAttributes,
    ) -> Result<Option<UserRecord>, neo4rs::Error> {
        let q = query(
            "MATCH (u:User {id: $id})
             WHERE u.detail = 'basic'
             SET u.screen_name = $screen_name,
                 u.detail = 'full',
                 u.accessed_at = $accessed_at,
                 u.profile_json = $profile_json
             RETURN u",
        )
        .param("id", profile.id.get())
        .param("screen_name", profile.screen_name.as_str())
        .param("accessed_at", format_datetime(&profile.accessed_at))
        .param("profile_json", profile_json(profile));

        let mut stream = self.client.graph.execute(q).await?;
        Ok(match stream.next().await? {
            Some(row) => row_to_user(&row),
            None => None,
        })
    }

    /// Insert `source -[:FOLLOWS]-> target` unless it already exists.
    pub async fn insert_follow(
        &self,
        source: UserId,
        target: UserId,
        on: DateTime<Utc>,
    ) -> Result<EdgeInsert, neo4rs::Error> {
        let q = query(
            "MATCH (a:User {id: $source}), (b:User {id: $target})
             OPTIONAL MATCH (a)-[existing:FOLLOWS]->(b)
             WITH a, b, count(existing) AS n
             FOREACH (_ IN CASE WHEN n = 0 THEN [1] ELSE [] END |
                 CREATE (a)-[:FOLLOWS {on: $on}]->(b))
             RETURN n = 0 AS created",
        )
        .param("source", source.get())
        .param("target", target.get())
        .param("on", format_datetime(&on));

        let mut stream = self.client.graph.execute(q).await?;
        let outcome = match stream.next().await? {
            Some(row) if row.get::<bool>("created").unwrap_or(false) => EdgeInsert::Created,
            Some(_) => EdgeInsert::AlreadyExists,
            None => EdgeInsert::MissingEndpoint,
        };
        debug!(%source, %target, ?outcome, "Follow edge insert");
        Ok(outcome)
    }

    async fn create_returning(
        &self,
        q: neo4rs::Query,
        id: UserId,
    ) -> Result<Option<UserRecord>, neo4rs::Error> {
        let mut stream = match self.client.graph.execute(q).await {
            Ok(stream) => stream,
            Err(e) if is_constraint_violation(&e) => {
                warn!(%id, "Concurrent create lost the user_id race");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match stream.next().await {
            Ok(Some(row)) => Ok(row_to_user(&row)),
            Ok(None) => Ok(None),
            Err(e) if is_constraint_violation(&e) => {
                warn!(%id, "Concurrent create lost the user_id race");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_constraint_violation(e: &neo4rs::Error) -> bool {
    let msg = e.to_string();
    msg.contains("ConstraintValidationFailed") || msg.contains("already exists with label")
}

fn profile_json(profile: &ProfileAttributes) -> String {
    serde_json::to_string(&profile.extra).unwrap_or_else(|_| "{}".to_string())
}

/// Timestamps are stored as RFC 3339 strings.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
