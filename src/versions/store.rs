use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::OnConflict,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entity::{device_config, device_config_versions, pump_models};
use crate::error::{AppError, AppResult};
use crate::versions::chain::{self, VersionPlan};
use crate::versions::model::{ConfigFields, ConfigPatch, ConfigVersion, VersionError};

/// Open version of a channel together with its pump model.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentConfig {
    #[serde(flatten)]
    pub version: ConfigVersion,
    #[schema(value_type = Option<Object>)]
    pub pump_model: Option<pump_models::Model>,
}

fn key_filter(device_id: &str, channel: &str) -> Condition {
    Condition::all()
        .add(device_config_versions::Column::DeviceId.eq(device_id))
        .add(device_config_versions::Column::Channel.eq(channel))
}

/// Open versions of every channel, with their pump model.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn current_all(db: &DatabaseConnection) -> AppResult<Vec<CurrentConfig>> {
    let rows = device_config_versions::Entity::find()
        .filter(device_config_versions::Column::EffectiveTo.is_null())
        .find_also_related(pump_models::Entity)
        .order_by_asc(device_config_versions::Column::DeviceId)
        .order_by_asc(device_config_versions::Column::Channel)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(version, pump_model)| CurrentConfig {
            version: version.into(),
            pump_model,
        })
        .collect())
}

/// Every version of a channel, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn history(
    db: &DatabaseConnection,
    device_id: &str,
    channel: &str,
) -> AppResult<Vec<ConfigVersion>> {
    let rows = device_config_versions::Entity::find()
        .filter(key_filter(device_id, channel))
        .order_by_desc(device_config_versions::Column::EffectiveFrom)
        .order_by_desc(device_config_versions::Column::Version)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(ConfigVersion::from).collect())
}

/// Versions of a channel whose interval intersects `[start, end]`.
///
/// Loaded once per channel when attributing a batch of cycles.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn load_overlapping(
    db: &DatabaseConnection,
    device_id: &str,
    channel: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<ConfigVersion>> {
    let rows = device_config_versions::Entity::find()
        .filter(key_filter(device_id, channel))
        .filter(device_config_versions::Column::EffectiveFrom.lte(end))
        .filter(
            Condition::any()
                .add(device_config_versions::Column::EffectiveTo.is_null())
                .add(device_config_versions::Column::EffectiveTo.gte(start)),
        )
        .order_by_asc(device_config_versions::Column::EffectiveFrom)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(ConfigVersion::from).collect())
}

async fn ensure_pump_model<C: ConnectionTrait>(db: &C, patch: &ConfigPatch) -> AppResult<()> {
    if let Some(id) = patch.pump_model_id
        && pump_models::Entity::find_by_id(id).one(db).await?.is_none()
    {
        return Err(AppError::BadRequest(format!("Unknown pump model: {id}")));
    }
    Ok(())
}

/// Mirror the open version into the `device_config` snapshot.
async fn upsert_snapshot<C: ConnectionTrait>(
    db: &C,
    device_id: &str,
    channel: &str,
    fields: &ConfigFields,
) -> AppResult<()> {
    let snapshot = device_config::ActiveModel {
        device_id: Set(device_id.to_string()),
        channel: Set(channel.to_string()),
        device_name: Set(None),
        channel_name: Set(fields.channel_name.clone()),
        pump_model_id: Set(fields.pump_model_id),
        flow_rate: Set(fields.flow_rate),
        pump_type: Set(fields.pump_type.as_str().to_string()),
        dbo5_mg_l: Set(fields.dbo5),
        dco_mg_l: Set(fields.dco),
        mes_mg_l: Set(fields.mes),
        updated_at: Set(Some(Utc::now().into())),
    };

    device_config::Entity::insert(snapshot)
        .on_conflict(
            OnConflict::columns([device_config::Column::DeviceId, device_config::Column::Channel])
                .update_columns([
                    device_config::Column::ChannelName,
                    device_config::Column::PumpModelId,
                    device_config::Column::FlowRate,
                    device_config::Column::PumpType,
                    device_config::Column::Dbo5MgL,
                    device_config::Column::DcoMgL,
                    device_config::Column::MesMgL,
                    device_config::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Start a new configuration version for a channel on `effective_from`.
///
/// Runs in a single transaction: the channel's versions are read `FOR UPDATE`,
/// the plan from [`chain::plan_set_version`] is applied, and the snapshot row
/// is refreshed.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an invalid patch or unknown pump model,
/// or a database error.
pub async fn set_version(
    db: &DatabaseConnection,
    device_id: &str,
    channel: &str,
    effective_from: NaiveDate,
    patch: &ConfigPatch,
) -> AppResult<ConfigVersion> {
    patch.validate()?;

    let txn = db.begin().await?;
    ensure_pump_model(&txn, patch).await?;

    let existing: Vec<ConfigVersion> = device_config_versions::Entity::find()
        .filter(key_filter(device_id, channel))
        .lock_exclusive()
        .all(&txn)
        .await?
        .into_iter()
        .map(ConfigVersion::from)
        .collect();

    let VersionPlan {
        deletes,
        closes,
        insert,
    } = chain::plan_set_version(&existing, effective_from, patch)?;

    if !deletes.is_empty() {
        device_config_versions::Entity::delete_many()
            .filter(device_config_versions::Column::Id.is_in(deletes.clone()))
            .exec(&txn)
            .await?;
    }
    for (id, last_day) in &closes {
        device_config_versions::ActiveModel {
            id: Set(*id),
            effective_to: Set(Some(*last_day)),
            ..Default::default()
        }
        .update(&txn)
        .await?;
    }

    let fields = insert.fields;
    let created = device_config_versions::ActiveModel {
        device_id: Set(device_id.to_string()),
        channel: Set(channel.to_string()),
        version: Set(insert.version),
        effective_from: Set(insert.effective_from),
        effective_to: Set(None),
        channel_name: Set(fields.channel_name.clone()),
        pump_model_id: Set(fields.pump_model_id),
        flow_rate: Set(fields.flow_rate),
        pump_type: Set(fields.pump_type.as_str().to_string()),
        dbo5: Set(fields.dbo5),
        dco: Set(fields.dco),
        mes: Set(fields.mes),
        created_at: Set(Some(Utc::now().into())),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    upsert_snapshot(&txn, device_id, channel, &fields).await?;
    txn.commit().await?;

    tracing::info!(
        device_id,
        channel,
        version = insert.version,
        effective_from = %insert.effective_from,
        deleted = deletes.len(),
        closed = closes.len(),
        "Config version added"
    );

    Ok(created.into())
}

/// Edit the open version of a channel in place, without starting a new epoch.
///
/// # Errors
///
/// Returns `AppError::NotFound` when the channel has no open version,
/// `AppError::BadRequest` for an invalid patch, or a database error.
pub async fn update_current(
    db: &DatabaseConnection,
    device_id: &str,
    channel: &str,
    patch: &ConfigPatch,
) -> AppResult<ConfigVersion> {
    patch.validate()?;

    let txn = db.begin().await?;
    ensure_pump_model(&txn, patch).await?;

    let open = device_config_versions::Entity::find()
        .filter(key_filter(device_id, channel))
        .filter(device_config_versions::Column::EffectiveTo.is_null())
        .order_by_desc(device_config_versions::Column::Version)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| VersionError::NoCurrentVersion {
            device_id: device_id.to_string(),
            channel: channel.to_string(),
        })?;

    let id = open.id;
    let fields = patch.merge(Some(&ConfigVersion::from(open).fields))?;

    let updated = device_config_versions::ActiveModel {
        id: Set(id),
        channel_name: Set(fields.channel_name.clone()),
        pump_model_id: Set(fields.pump_model_id),
        flow_rate: Set(fields.flow_rate),
        pump_type: Set(fields.pump_type.as_str().to_string()),
        dbo5: Set(fields.dbo5),
        dco: Set(fields.dco),
        mes: Set(fields.mes),
        ..Default::default()
    }
    .update(&txn)
    .await?;

    upsert_snapshot(&txn, device_id, channel, &fields).await?;
    txn.commit().await?;

    tracing::info!(device_id, channel, "Current config updated");
    Ok(updated.into())
}
