use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pump_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub power_kw: f64,
    pub current_ampere: f64,
    pub flow_rate_hmt8: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::device_config_versions::Entity")]
    ConfigVersions,
    #[sea_orm(has_many = "super::device_config::Entity")]
    DeviceConfig,
}

impl Related<super::device_config_versions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConfigVersions.def()
    }
}

impl Related<super::device_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeviceConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
