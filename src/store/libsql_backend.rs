//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ActivityKind, ActivityRecord, Database, NewPurchaseIntent, PurchaseIntentRecord,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

const ACTIVITY_COLUMNS: &str = "id, session_id, channel_id, kind, payload, created_at";

const INTENT_COLUMNS: &str = "id, session_id, channel_id, user_id, item_name, item_price, intent, confidence, created_at";

fn row_to_activity(row: &libsql::Row) -> Result<ActivityRecord, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("activity column {idx}: {e}")))
    };
    let kind_str = get(3)?;
    let kind = ActivityKind::parse(&kind_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown activity kind {kind_str}")))?;
    let payload = serde_json::from_str(&get(4)?)
        .map_err(|e| DatabaseError::Serialization(format!("activity.payload: {e}")))?;

    Ok(ActivityRecord {
        id: parse_uuid(&get(0)?, "activity.id")?,
        session_id: parse_uuid(&get(1)?, "activity.session_id")?,
        channel_id: get(2)?,
        kind,
        payload,
        created_at: parse_datetime(&get(5)?),
    })
}

fn row_to_intent(row: &libsql::Row) -> Result<PurchaseIntentRecord, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("purchase_intent column {idx}: {e}")))
    };

    Ok(PurchaseIntentRecord {
        id: parse_uuid(&get(0)?, "purchase_intent.id")?,
        intent: NewPurchaseIntent {
            session_id: parse_uuid(&get(1)?, "purchase_intent.session_id")?,
            channel_id: get(2)?,
            user_id: get(3)?,
            item_name: get(4)?,
            item_price: get(5)?,
            intent: get(6)?,
            confidence: row.get::<f64>(7).ok(),
        },
        created_at: parse_datetime(&get(8)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    // ── Sessions ────────────────────────────────────────────────────

    async fn end_session(&self, session_id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO sessions (id, ended_at) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET ended_at = COALESCE(sessions.ended_at, excluded.ended_at)",
                params![session_id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("end_session: {e}")))?;

        debug!(session_id = %session_id, "Session marked ended in DB");
        Ok(())
    }

    async fn is_session_ended(&self, session_id: Uuid) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT ended_at FROM sessions WHERE id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_session_ended: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).is_ok()),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("is_session_ended: {e}"))),
        }
    }

    // ── Activity ────────────────────────────────────────────────────

    async fn record_activity(
        &self,
        session_id: Uuid,
        channel_id: &str,
        kind: ActivityKind,
        payload: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(payload)
            .map_err(|e| DatabaseError::Serialization(format!("activity payload: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO activities (id, session_id, channel_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, session_id.to_string(), channel_id, kind.as_str(), payload, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_activity: {e}")))?;
        Ok(())
    }

    async fn list_activities(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE session_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_activities: {e}")))?;

        let mut activities = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_activity(&row) {
                Ok(record) => activities.push(record),
                Err(e) => tracing::warn!("Skipping activity row: {e}"),
            }
        }
        Ok(activities)
    }

    // ── Purchase intents ────────────────────────────────────────────

    async fn create_purchase_intent(
        &self,
        intent: &NewPurchaseIntent,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                &format!("INSERT INTO purchase_intents ({INTENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    id.to_string(),
                    intent.session_id.to_string(),
                    intent.channel_id.as_str(),
                    intent.user_id.as_str(),
                    intent.item_name.as_str(),
                    intent.item_price.as_str(),
                    intent.intent.as_str(),
                    opt_real(intent.confidence),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_purchase_intent: {e}")))?;

        debug!(
            intent_id = %id,
            session_id = %intent.session_id,
            "Purchase intent inserted into DB"
        );
        Ok(id)
    }

    async fn list_purchase_intents(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<PurchaseIntentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INTENT_COLUMNS} FROM purchase_intents WHERE session_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_purchase_intents: {e}")))?;

        let mut intents = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_intent(&row) {
                Ok(record) => intents.push(record),
                Err(e) => tracing::warn!("Skipping purchase intent row: {e}"),
            }
        }
        Ok(intents)
    }
}
