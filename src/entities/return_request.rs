use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::return_record::{ReturnRecord, ReturnStatus};

/// The `return_requests` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: String,
    pub email: String,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::return_status_change::Entity")]
    StatusChanges,
}

impl Related<super::return_status_change::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusChanges.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ReturnRecord {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = ReturnStatus::from_str(&model.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "return {} has unknown status '{}'",
                model.id, model.status
            ))
        })?;

        Ok(ReturnRecord {
            id: model.id,
            order_id: model.order_id,
            email: model.email,
            reason: model.reason,
            status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
