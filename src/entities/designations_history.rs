use sea_orm::entity::prelude::*;

/// Append-only audit log for designation mutations.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "designations_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub designation_id: i32,

    /// INSERT, UPDATE or DELETE
    pub action: String,

    pub action_by: String,

    pub action_at: DateTimeUtc,

    pub old_data: Option<Json>,

    pub new_data: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::designations::Entity",
        from = "Column::DesignationId",
        to = "super::designations::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Designations,
}

impl Related<super::designations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Designations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
