use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Stable external key (e.g. EMP2025A001), stored upper-case.
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Lower-cased at write time.
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    pub designation_id: Option<i32>,

    pub phone_number: Option<String>,

    // Lifecycle flags
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_email_verified: bool,

    // Failed-login counters, see domain::lockout for the tier policy.
    pub failed_login_attempts: i32,
    pub last_failed_login: Option<DateTimeUtc>,
    pub locked_until: Option<DateTimeUtc>,
    pub permanent_lock: bool,
    pub lock_reason: Option<String>,

    // Transient OTP state, single live code per user.
    pub otp_code: Option<String>,
    pub otp_created_at: Option<DateTimeUtc>,
    pub otp_expiry: Option<DateTimeUtc>,
    pub otp_attempts: i32,
    pub otp_max_attempts: i32,
    pub otp_verified: bool,

    pub last_login: Option<DateTimeUtc>,
    pub last_login_ip: Option<String>,
    pub password_changed_at: Option<DateTimeUtc>,

    pub created_by: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_by: Option<String>,
    pub updated_at: DateTimeUtc,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTimeUtc>,
    pub deleted_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::designations::Entity",
        from = "Column::DesignationId",
        to = "super::designations::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Designations,
    #[sea_orm(has_many = "super::password_history::Entity")]
    PasswordHistory,
    #[sea_orm(has_many = "super::users_history::Entity")]
    UsersHistory,
}

impl Related<super::designations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Designations.def()
    }
}

impl Related<super::password_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PasswordHistory.def()
    }
}

impl Related<super::users_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsersHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
