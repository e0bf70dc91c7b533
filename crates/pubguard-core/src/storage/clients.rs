//! Read-only client repository (§6): cadence rules, platform accounts, and
//! guardrails. The surrounding system (client profile, voice profile, and
//! intelligence stores) owns this data; this module only reads the two
//! tables it populates in the content database.

use super::DbPool;
use crate::error::StorageError;

/// Per-client cadence constraints (§4.5 cadence enforcer, §8).
#[derive(Debug, Clone, sqlx::FromRow)]
struct CadenceRow {
    min_hours_between_posts: i64,
    posts_per_week_per_platform: i64,
    preferred_days: String,
}

#[derive(Debug, Clone)]
pub struct Cadence {
    pub min_hours_between_posts: i64,
    pub posts_per_week_per_platform: i64,
    pub preferred_days: Vec<String>,
}

/// Fetch cadence rules for a client. Returns `None` if the client has no
/// cadence row, which callers should treat as "unconstrained" only at the
/// boundary that calls this -- the cadence enforcer itself requires a row
/// to exist before scheduling.
pub async fn get_cadence(pool: &DbPool, client_id: &str) -> Result<Option<Cadence>, StorageError> {
    let row = sqlx::query_as::<_, CadenceRow>(
        "SELECT min_hours_between_posts, posts_per_week_per_platform, preferred_days \
         FROM client_cadence WHERE client_id = ?",
    )
    .bind(client_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    row.map(|r| {
        let preferred_days: Vec<String> = serde_json::from_str(&r.preferred_days)
            .map_err(|e| StorageError::Query {
                source: sqlx::Error::Decode(
                    format!("client_cadence.preferred_days: {e}").into(),
                ),
            })?;
        Ok(Cadence {
            min_hours_between_posts: r.min_hours_between_posts,
            posts_per_week_per_platform: r.posts_per_week_per_platform,
            preferred_days,
        })
    })
    .transpose()
}

/// A client's platform account identifiers (§6).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformAccounts {
    pub facebook_id: Option<String>,
    pub instagram_id: Option<String>,
}

pub async fn get_platform_accounts(
    pool: &DbPool,
    client_id: &str,
) -> Result<Option<PlatformAccounts>, StorageError> {
    sqlx::query_as::<_, PlatformAccounts>(
        "SELECT facebook_id, instagram_id FROM client_platform_accounts WHERE client_id = ?",
    )
    .bind(client_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Opaque per-client guardrails (§6: `get_guardrails(client_id) → opaque`).
/// The core treats this as a blob it stores and forwards, never interprets
/// -- the surrounding quality-gating system defines its shape.
pub async fn get_guardrails(
    pool: &DbPool,
    client_id: &str,
) -> Result<Option<serde_json::Value>, StorageError> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT guardrails FROM client_guardrails WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;

    match row.and_then(|(g,)| g) {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Query {
                source: sqlx::Error::Decode(format!("client_guardrails.guardrails: {e}").into()),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_client_cadence_is_none() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let cadence = get_cadence(&pool, "no-such-client").await.unwrap();
        assert!(cadence.is_none());
    }

    #[tokio::test]
    async fn cadence_round_trips_preferred_days() {
        let pool = crate::storage::init_test_db().await.unwrap();
        sqlx::query(
            "INSERT INTO client_cadence (client_id, min_hours_between_posts, \
             posts_per_week_per_platform, preferred_days) VALUES (?, ?, ?, ?)",
        )
        .bind("client-1")
        .bind(12_i64)
        .bind(5_i64)
        .bind(r#"["mon","wed","fri"]"#)
        .execute(&pool)
        .await
        .unwrap();

        let cadence = get_cadence(&pool, "client-1").await.unwrap().unwrap();
        assert_eq!(cadence.min_hours_between_posts, 12);
        assert_eq!(cadence.preferred_days, vec!["mon", "wed", "fri"]);
    }

    #[tokio::test]
    async fn platform_accounts_round_trip() {
        let pool = crate::storage::init_test_db().await.unwrap();
        sqlx::query(
            "INSERT INTO client_platform_accounts (client_id, facebook_id, instagram_id) \
             VALUES (?, ?, ?)",
        )
        .bind("client-1")
        .bind("fb-123")
        .bind("ig-456")
        .execute(&pool)
        .await
        .unwrap();

        let accounts = get_platform_accounts(&pool, "client-1").await.unwrap().unwrap();
        assert_eq!(accounts.facebook_id.as_deref(), Some("fb-123"));
        assert_eq!(accounts.instagram_id.as_deref(), Some("ig-456"));
    }
}
