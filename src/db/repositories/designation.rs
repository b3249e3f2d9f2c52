use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use super::audit::{AuditAction, AuditEntity, AuditRepository};
use crate::domain::{Actor, Permissions};
use crate::entities::designations;

pub const SUPERADMIN_CODE: &str = "SUPERADMIN";

pub struct DesignationRepository {
    conn: DatabaseConnection,
}

impl DesignationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<designations::Model>> {
        designations::Entity::find_by_id(id)
            .filter(designations::Column::IsDeleted.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query designation by id")
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<designations::Model>> {
        designations::Entity::find()
            .filter(designations::Column::Code.eq(code))
            .filter(designations::Column::IsDeleted.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query designation by code")
    }

    /// Create a designation and its INSERT audit record in one transaction.
    pub async fn create(
        &self,
        name: &str,
        code: &str,
        description: Option<&str>,
        permissions: &Permissions,
        actor: &Actor,
    ) -> Result<designations::Model> {
        let now = Utc::now();
        let txn = self.conn.begin().await?;

        let active = designations::ActiveModel {
            name: Set(name.to_string()),
            code: Set(code.to_string()),
            description: Set(description.map(ToString::to_string)),
            permissions: Set(permissions.to_value()),
            is_active: Set(true),
            created_by: Set(Some(actor.as_str().to_string())),
            created_at: Set(now),
            updated_by: Set(Some(actor.as_str().to_string())),
            updated_at: Set(now),
            is_deleted: Set(false),
            ..Default::default()
        };
        let model = active
            .insert(&txn)
            .await
            .context("Failed to insert designation")?;

        AuditRepository::record_with(
            &txn,
            AuditEntity::Designation(model.id),
            AuditAction::Insert,
            actor,
            None,
            Some(snapshot(&model)),
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(model)
    }

    /// Fetch the SUPERADMIN designation, creating it with the full permission
    /// map if it does not exist yet.
    pub async fn ensure_superadmin(&self, actor: &Actor) -> Result<designations::Model> {
        if let Some(existing) = self.get_by_code(SUPERADMIN_CODE).await? {
            return Ok(existing);
        }
        self.create(
            "Super Admin",
            SUPERADMIN_CODE,
            Some("Full system access"),
            &Permissions::superadmin(),
            actor,
        )
        .await
    }

    /// Soft delete: flips the lifecycle flags and appends the DELETE audit
    /// record in the same transaction. The row itself stays in storage.
    pub async fn soft_delete(&self, model: designations::Model, actor: &Actor) -> Result<()> {
        let now = Utc::now();
        let old = snapshot(&model);
        let id = model.id;
        let txn = self.conn.begin().await?;

        let mut active: designations::ActiveModel = model.into();
        active.is_deleted = Set(true);
        active.deleted_at = Set(Some(now));
        active.deleted_by = Set(Some(actor.as_str().to_string()));
        active.updated_by = Set(Some(actor.as_str().to_string()));
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .context("Failed to soft-delete designation")?;

        AuditRepository::record_with(
            &txn,
            AuditEntity::Designation(id),
            AuditAction::Delete,
            actor,
            Some(old),
            None,
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Permissions for a user's designation; `None` designation or a deleted
    /// row resolves to an empty map.
    pub async fn permissions_for(&self, designation_id: Option<i32>) -> Result<Permissions> {
        let Some(id) = designation_id else {
            return Ok(Permissions::new());
        };
        Ok(self
            .get_by_id(id)
            .await?
            .map(|d| Permissions::from_value(&d.permissions))
            .unwrap_or_default())
    }
}

fn snapshot(model: &designations::Model) -> serde_json::Value {
    serde_json::json!({
        "name": model.name,
        "code": model.code,
        "description": model.description,
        "permissions": model.permissions,
        "is_active": model.is_active,
    })
}
