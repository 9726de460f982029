use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::entity::{device_config, device_config_versions, pump_models};
use crate::error::{AppError, AppResult};

/// Catalogue entry as submitted by an administrator.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PumpModelInput {
    pub name: String,
    pub power_kw: f64,
    pub current_ampere: f64,
    /// Flow rate at 8 m head, m³/h
    pub flow_rate_hmt8: Option<f64>,
}

impl PumpModelInput {
    fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Pump model name is required".to_string()));
        }
        if !(self.power_kw.is_finite() && self.power_kw >= 0.0) {
            return Err(AppError::BadRequest(format!(
                "power_kw must not be negative, got {}",
                self.power_kw
            )));
        }
        if !(self.current_ampere.is_finite() && self.current_ampere >= 0.0) {
            return Err(AppError::BadRequest(format!(
                "current_ampere must not be negative, got {}",
                self.current_ampere
            )));
        }
        if let Some(flow) = self.flow_rate_hmt8
            && !(flow.is_finite() && flow > 0.0)
        {
            return Err(AppError::BadRequest(format!(
                "flow_rate_hmt8 must be positive, got {flow}"
            )));
        }
        Ok(())
    }
}

/// # Errors
///
/// Returns an error if the database query fails.
pub async fn list(db: &DatabaseConnection) -> AppResult<Vec<pump_models::Model>> {
    Ok(pump_models::Entity::find()
        .order_by_asc(pump_models::Column::Name)
        .all(db)
        .await?)
}

/// # Errors
///
/// Returns `AppError::BadRequest` for invalid input, or a database error.
pub async fn create(db: &DatabaseConnection, input: PumpModelInput) -> AppResult<pump_models::Model> {
    input.validate()?;
    let model = pump_models::ActiveModel {
        name: Set(input.name.trim().to_string()),
        power_kw: Set(input.power_kw),
        current_ampere: Set(input.current_ampere),
        flow_rate_hmt8: Set(input.flow_rate_hmt8),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(id = model.id, name = %model.name, "Pump model created");
    Ok(model)
}

/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id, `AppError::BadRequest` for
/// invalid input, or a database error.
pub async fn update(
    db: &DatabaseConnection,
    id: i32,
    input: PumpModelInput,
) -> AppResult<pump_models::Model> {
    input.validate()?;
    if pump_models::Entity::find_by_id(id).one(db).await?.is_none() {
        return Err(AppError::NotFound(format!("Pump model not found: {id}")));
    }

    let model = pump_models::ActiveModel {
        id: Set(id),
        name: Set(input.name.trim().to_string()),
        power_kw: Set(input.power_kw),
        current_ampere: Set(input.current_ampere),
        flow_rate_hmt8: Set(input.flow_rate_hmt8),
    }
    .update(db)
    .await?;

    tracing::info!(id, "Pump model updated");
    Ok(model)
}

/// Delete a pump model that no configuration refers to.
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id, `AppError::Conflict` while
/// a configuration version or snapshot still references it, or a database error.
pub async fn delete(db: &DatabaseConnection, id: i32) -> AppResult<()> {
    if pump_models::Entity::find_by_id(id).one(db).await?.is_none() {
        return Err(AppError::NotFound(format!("Pump model not found: {id}")));
    }

    let in_versions = device_config_versions::Entity::find()
        .filter(device_config_versions::Column::PumpModelId.eq(id))
        .count(db)
        .await?;
    let in_snapshots = device_config::Entity::find()
        .filter(device_config::Column::PumpModelId.eq(id))
        .count(db)
        .await?;

    let references = in_versions + in_snapshots;
    if references > 0 {
        return Err(AppError::Conflict(format!(
            "Pump model {id} is still referenced by {references} configuration(s)"
        )));
    }

    pump_models::Entity::delete_by_id(id).exec(db).await?;
    tracing::info!(id, "Pump model deleted");
    Ok(())
}
