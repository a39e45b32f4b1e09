use chrono::{DateTime, NaiveDateTime, Utc};
use neo4rs::query;
use tracing::warn;

use followgraph_common::{Attributes, Detail, RankedUser, UserId, UserRecord};

use crate::writer::UserStore;

impl UserStore {
    /// Look up a record through the `user_id` constraint index.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, neo4rs::Error> {
        let q = query("MATCH (u:User {id: $id}) RETURN u LIMIT 1").param("id", id.get());

        let mut stream = self.client.graph.execute(q).await?;
        Ok(match stream.next().await? {
            Some(row) => row_to_user(&row),
            None => None,
        })
    }

    /// Look up a record through the `screen_name` index. If a label moved
    /// between accounts the most recently written node wins.
    pub async fn find_by_screen_name(
        &self,
        screen_name: &str,
    ) -> Result<Option<UserRecord>, neo4rs::Error> {
        let q = query(
            "MATCH (u:User {screen_name: $screen_name})
             RETURN u
             ORDER BY u.accessed_at DESC
             LIMIT 2",
        )
        .param("screen_name", screen_name);

        let mut stream = self.client.graph.execute(q).await?;
        let mut found = Vec::new();
        while let Some(row) = stream.next().await? {
            if let Some(user) = row_to_user(&row) {
                found.push(user);
            }
        }
        if found.len() > 1 {
            warn!(screen_name, "Multiple users share a screen name, using newest");
        }
        Ok(found.into_iter().next())
    }

    pub async fn follow_exists(&self, source: UserId, target: UserId) -> Result<bool, neo4rs::Error> {
        let q = query(
            "MATCH (a:User {id: $source})-[r:FOLLOWS]->(b:User {id: $target})
             RETURN count(r) > 0 AS present",
        )
        .param("source", source.get())
        .param("target", target.get());

        let mut stream = self.client.graph.execute(q).await?;
        Ok(match stream.next().await? {
            Some(row) => row.get::<bool>("present").unwrap_or(false),
            None => false,
        })
    }

    /// Incident `FOLLOWS` edges in either direction. Zero for unknown IDs.
    pub async fn degree_of(&self, id: UserId) -> Result<u64, neo4rs::Error> {
        let q = query(
            "MATCH (u:User {id: $id})
             OPTIONAL MATCH (u)-[r:FOLLOWS]-()
             RETURN count(r) AS degree",
        )
        .param("id", id.get());

        let mut stream = self.client.graph.execute(q).await?;
        Ok(match stream.next().await? {
            Some(row) => row.get::<i64>("degree").unwrap_or(0).max(0) as u64,
            None => 0,
        })
    }

    /// Every `basic` record with its degree, highest degree first, ties by ascending ID.
    pub async fn list_basic_by_degree(&self) -> Result<Vec<RankedUser>, neo4rs::Error> {
        let q = query(
            "MATCH (u:User {detail: 'basic'})
             OPTIONAL MATCH (u)-[r:FOLLOWS]-()
             WITH u, count(r) AS degree
             RETURN u, degree
             ORDER BY degree DESC, u.id ASC",
        );

        let mut stream = self.client.graph.execute(q).await?;
        let mut ranked = Vec::new();
        while let Some(row) = stream.next().await? {
            let Some(record) = row_to_user(&row) else {
                continue;
            };
            let degree = row.get::<i64>("degree").unwrap_or(0).max(0) as u64;
            ranked.push(RankedUser { record, degree });
        }
        Ok(ranked)
    }

    /// Node counts by detail level, for run summaries.
    pub async fn count_by_detail(&self) -> Result<(u64, u64), neo4rs::Error> {
        let q = query(
            "MATCH (u:User)
             RETURN count(CASE WHEN u.detail = 'basic' THEN 1 END) AS basic,
                    count(CASE WHEN u.detail = 'full' THEN 1 END) AS full",
        );

        let mut stream = self.client.graph.execute(q).await?;
        Ok(match stream.next().await? {
            Some(row) => (
                row.get::<i64>("basic").unwrap_or(0).max(0) as u64,
                row.get::<i64>("full").unwrap_or(0).max(0) as u64,
            ),
            None => (0, 0),
        })
    }
}

/// Decode the `u` column into a record. Rows without a numeric `id` are skipped.
pub(crate) fn row_to_user(row: &neo4rs::Row) -> Option<UserRecord> {
    let n: neo4rs::Node = row.get("u").ok()?;

    let id: i64 = n.get("id").ok()?;
    let screen_name: Option<String> = n.get("screen_name").ok();
    let detail = n
        .get::<String>("detail")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Detail::Basic);
    let accessed_at = parse_datetime_prop(&n, "accessed_at");
    let attributes: Attributes = n
        .get::<String>("profile_json")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Some(UserRecord {
        id: UserId(id),
        screen_name,
        detail,
        accessed_at,
        attributes,
    })
}

fn parse_datetime_prop(n: &neo4rs::Node, prop: &str) -> DateTime<Utc> {
    if let Ok(s) = n.get::<String>(prop) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f") {
            return naive.and_utc();
        }
    }
    Utc::now()
}
