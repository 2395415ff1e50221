use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Append-only record of a privileged action. Rows are never updated or
/// deleted; ordering by id matches ordering by ts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub ts: String,

    pub actor_id: i64,

    pub action: String,

    pub entity: String,

    pub entity_id: i64,

    pub details: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
