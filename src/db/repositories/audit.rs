use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::Actor;
use crate::entities::{designations_history, users_history};

/// What happened to the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Which history table receives the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntity {
    User(String),
    Designation(i32),
}

/// Append-only recorder for entity history. Records are written in the same
/// transaction as the entity mutation and are never updated or deleted.
pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(
        &self,
        entity: AuditEntity,
        action: AuditAction,
        actor: &Actor,
        old_data: Option<serde_json::Value>,
        new_data: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        Self::record_with(&self.conn, entity, action, actor, old_data, new_data, at).await
    }

    /// Same as [`record`](Self::record) but usable inside an open transaction.
    pub async fn record_with<C: ConnectionTrait>(
        conn: &C,
        entity: AuditEntity,
        action: AuditAction,
        actor: &Actor,
        old_data: Option<serde_json::Value>,
        new_data: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        match entity {
            AuditEntity::User(user_id) => {
                let row = users_history::ActiveModel {
                    user_id: Set(user_id),
                    action: Set(action.as_str().to_string()),
                    action_by: Set(actor.as_str().to_string()),
                    action_at: Set(at),
                    old_data: Set(old_data),
                    new_data: Set(new_data),
                    ..Default::default()
                };
                users_history::Entity::insert(row)
                    .exec(conn)
                    .await
                    .context("Failed to append user history record")?;
            }
            AuditEntity::Designation(designation_id) => {
                let row = designations_history::ActiveModel {
                    designation_id: Set(designation_id),
                    action: Set(action.as_str().to_string()),
                    action_by: Set(actor.as_str().to_string()),
                    action_at: Set(at),
                    old_data: Set(old_data),
                    new_data: Set(new_data),
                    ..Default::default()
                };
                designations_history::Entity::insert(row)
                    .exec(conn)
                    .await
                    .context("Failed to append designation history record")?;
            }
        }
        Ok(())
    }

    /// Audit trail for one user, most recent first.
    pub async fn user_trail(&self, user_id: &str) -> Result<Vec<users_history::Model>> {
        users_history::Entity::find()
            .filter(users_history::Column::UserId.eq(user_id))
            .order_by_desc(users_history::Column::ActionAt)
            .all(&self.conn)
            .await
            .context("Failed to query user history")
    }

    /// Audit trail for one designation, most recent first.
    pub async fn designation_trail(
        &self,
        designation_id: i32,
    ) -> Result<Vec<designations_history::Model>> {
        designations_history::Entity::find()
            .filter(designations_history::Column::DesignationId.eq(designation_id))
            .order_by_desc(designations_history::Column::ActionAt)
            .all(&self.conn)
            .await
            .context("Failed to query designation history")
    }
}
