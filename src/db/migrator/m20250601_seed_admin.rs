use crate::domain::Permissions;
use crate::entities::prelude::*;
use crate::entities::{designations, password_history, users, users_history};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Initial administrator credential. Rotate after the first login; the
/// password-history rule applies from then on.
const ADMIN_USER_ID: &str = "ADMIN001";
const ADMIN_PASSWORD: &str = "ChangeMe!2025";

const SUPERADMIN_DESIGNATION_ID: i32 = 1;

/// Hash the seed password with the default Argon2id parameters.
fn hash_seed_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("Failed to hash seed admin password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let now = chrono::Utc::now();
        let password_hash = hash_seed_password();

        let insert_designation = Query::insert()
            .into_table(Designations)
            .columns([
                designations::Column::Id,
                designations::Column::Name,
                designations::Column::Code,
                designations::Column::Description,
                designations::Column::Permissions,
                designations::Column::IsActive,
                designations::Column::CreatedBy,
                designations::Column::CreatedAt,
                designations::Column::UpdatedBy,
                designations::Column::UpdatedAt,
                designations::Column::IsDeleted,
            ])
            .values_panic([
                SUPERADMIN_DESIGNATION_ID.into(),
                "Super Admin".into(),
                "SUPERADMIN".into(),
                "Full system access".into(),
                Permissions::superadmin().to_value().into(),
                true.into(),
                "system".into(),
                now.into(),
                "system".into(),
                now.into(),
                false.into(),
            ])
            .to_owned();
        manager.exec_stmt(insert_designation).await?;

        let insert_admin = Query::insert()
            .into_table(Users)
            .columns([
                users::Column::UserId,
                users::Column::Username,
                users::Column::Email,
                users::Column::PasswordHash,
                users::Column::FirstName,
                users::Column::LastName,
                users::Column::DesignationId,
                users::Column::IsActive,
                users::Column::IsStaff,
                users::Column::IsSuperuser,
                users::Column::IsEmailVerified,
                users::Column::FailedLoginAttempts,
                users::Column::PermanentLock,
                users::Column::OtpAttempts,
                users::Column::OtpMaxAttempts,
                users::Column::OtpVerified,
                users::Column::CreatedBy,
                users::Column::CreatedAt,
                users::Column::UpdatedBy,
                users::Column::UpdatedAt,
                users::Column::IsDeleted,
            ])
            .values_panic([
                ADMIN_USER_ID.into(),
                "admin".into(),
                "admin@collegium.local".into(),
                password_hash.clone().into(),
                "System".into(),
                "Administrator".into(),
                SUPERADMIN_DESIGNATION_ID.into(),
                true.into(),
                true.into(),
                true.into(),
                true.into(),
                0.into(),
                false.into(),
                0.into(),
                3.into(),
                false.into(),
                "system".into(),
                now.into(),
                "system".into(),
                now.into(),
                false.into(),
            ])
            .to_owned();
        manager.exec_stmt(insert_admin).await?;

        // The current hash starts the rolling history so the reuse check
        // covers the seed credential as well.
        let insert_history = Query::insert()
            .into_table(PasswordHistory)
            .columns([
                password_history::Column::UserId,
                password_history::Column::PasswordHash,
                password_history::Column::CreatedAt,
            ])
            .values_panic([ADMIN_USER_ID.into(), password_hash.into(), now.into()])
            .to_owned();
        manager.exec_stmt(insert_history).await?;

        let insert_audit = Query::insert()
            .into_table(UsersHistory)
            .columns([
                users_history::Column::UserId,
                users_history::Column::Action,
                users_history::Column::ActionBy,
                users_history::Column::ActionAt,
                users_history::Column::NewData,
            ])
            .values_panic([
                ADMIN_USER_ID.into(),
                "INSERT".into(),
                "system".into(),
                now.into(),
                serde_json::json!({
                    "username": "admin",
                    "email": "admin@collegium.local",
                    "designation_id": SUPERADMIN_DESIGNATION_ID,
                    "is_active": true,
                    "is_superuser": true,
                })
                .into(),
            ])
            .to_owned();
        manager.exec_stmt(insert_audit).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete_admin = Query::delete()
            .from_table(Users)
            .and_where(Expr::col(users::Column::UserId).eq(ADMIN_USER_ID))
            .to_owned();
        manager.exec_stmt(delete_admin).await?;

        let delete_designation = Query::delete()
            .from_table(Designations)
            .and_where(Expr::col(designations::Column::Id).eq(SUPERADMIN_DESIGNATION_ID))
            .to_owned();
        manager.exec_stmt(delete_designation).await?;

        Ok(())
    }
}
