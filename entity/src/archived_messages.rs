//! SeaORM Entity for the archived_messages table.
//! Cold storage for messages moved out of `messages` by the archival sweep.

use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize, ToSchema)]
#[schema(as = entity::archived_messages::Model)]
#[sea_orm(schema_name = "heydays", table_name = "archived_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,
    pub chat_id: Id,
    pub sender_id: Id,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub is_read: bool,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub read_at: Option<DateTimeWithTimeZone>,
    /// Creation time of the original message
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String, format = DateTime)]
    pub archived_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
