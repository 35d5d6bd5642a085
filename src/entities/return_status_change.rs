use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::return_record::{ReturnStatus, StatusChange};

/// Audit trail of status changes applied to return requests.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_status_changes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub changed_by: Option<String>,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::return_request::Entity",
        from = "Column::ReturnId",
        to = "super::return_request::Column::Id",
        on_delete = "Cascade"
    )]
    ReturnRequest,
}

impl Related<super::return_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn parse_status(raw: &str, change_id: Uuid) -> Result<ReturnStatus, ServiceError> {
    ReturnStatus::from_str(raw).map_err(|_| {
        ServiceError::InternalError(format!(
            "status change {} has unknown status '{}'",
            change_id, raw
        ))
    })
}

impl TryFrom<Model> for StatusChange {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(StatusChange {
            id: model.id,
            return_id: model.return_id,
            from_status: parse_status(&model.from_status, model.id)?,
            to_status: parse_status(&model.to_status, model.id)?,
            changed_by: model.changed_by,
            note: model.note,
            changed_at: model.changed_at,
        })
    }
}
