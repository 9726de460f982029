use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_config_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub device_id: String,
    pub channel: String,
    pub version: i32,
    pub effective_from: Date,
    pub effective_to: Option<Date>,
    pub channel_name: Option<String>,
    pub pump_model_id: Option<i32>,
    pub flow_rate: Option<f64>,
    pub pump_type: String,
    pub dbo5: Option<i32>,
    pub dco: Option<i32>,
    pub mes: Option<i32>,
    pub created_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pump_models::Entity",
        from = "Column::PumpModelId",
        to = "super::pump_models::Column::Id"
    )]
    PumpModel,
}

impl Related<super::pump_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PumpModel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
