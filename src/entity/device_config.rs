use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Denormalised snapshot of the open config version, one row per channel.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub device_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel: String,
    pub device_name: Option<String>,
    pub channel_name: Option<String>,
    pub pump_model_id: Option<i32>,
    pub flow_rate: Option<f64>,
    pub pump_type: String,
    pub dbo5_mg_l: Option<i32>,
    pub dco_mg_l: Option<i32>,
    pub mes_mg_l: Option<i32>,
    pub updated_at: Option<DateTimeWithTimeZone>,
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
