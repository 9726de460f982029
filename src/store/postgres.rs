use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::OnConflict,
};

use super::{Reading, ReadingFilter, ReadingStore};
use crate::entity::power_logs;
use crate::error::AppResult;

/// Batch size for bulk inserts
const BATCH_SIZE: usize = 1000;

/// `power_logs` table access through sea-orm.
#[derive(Clone)]
pub struct SeaOrmReadingStore {
    db: DatabaseConnection,
}

impl SeaOrmReadingStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_active(reading: Reading) -> power_logs::ActiveModel {
    power_logs::ActiveModel {
        device_id: Set(reading.device_id),
        channel: Set(reading.channel),
        timestamp: Set(reading.timestamp.into()),
        apower_w: Set(reading.power_w),
        voltage_v: Set(reading.voltage_v),
        current_a: Set(reading.current_a),
        energy_total_wh: Set(reading.energy_total_wh),
        idempotency_key: Set(reading.idempotency_key),
    }
}

impl From<power_logs::Model> for Reading {
    fn from(row: power_logs::Model) -> Self {
        Self {
            device_id: row.device_id,
            channel: row.channel,
            timestamp: row.timestamp.with_timezone(&Utc),
            power_w: row.apower_w,
            voltage_v: row.voltage_v,
            current_a: row.current_a,
            energy_total_wh: row.energy_total_wh,
            idempotency_key: row.idempotency_key,
        }
    }
}

// The idempotency key is derived from the same (device, channel, minute)
// triple as the primary key, so conflicting on the key columns covers both.
fn skip_duplicates() -> OnConflict {
    OnConflict::columns([
        power_logs::Column::DeviceId,
        power_logs::Column::Channel,
        power_logs::Column::Timestamp,
    ])
    .do_nothing()
    .to_owned()
}

#[async_trait]
impl ReadingStore for SeaOrmReadingStore {
    async fn insert(&self, reading: Reading) -> AppResult<bool> {
        let rows = power_logs::Entity::insert(to_active(reading))
            .on_conflict(skip_duplicates())
            .exec_without_returning(&self.db)
            .await?;
        Ok(rows > 0)
    }

    async fn insert_many(&self, readings: Vec<Reading>) -> AppResult<u64> {
        let models: Vec<power_logs::ActiveModel> = readings.into_iter().map(to_active).collect();
        let mut inserted = 0;

        for chunk in models.chunks(BATCH_SIZE) {
            inserted += power_logs::Entity::insert_many(chunk.to_vec())
                .on_conflict(skip_duplicates())
                .exec_without_returning(&self.db)
                .await?;
        }

        Ok(inserted)
    }

    async fn has_stop_conflict(
        &self,
        device_id: &str,
        channel: &str,
        minute: DateTime<Utc>,
        threshold: f64,
    ) -> AppResult<bool> {
        let count = power_logs::Entity::find()
            .filter(power_logs::Column::DeviceId.eq(device_id))
            .filter(power_logs::Column::Channel.eq(channel))
            .filter(power_logs::Column::Timestamp.eq(minute))
            .filter(
                Condition::any()
                    .add(power_logs::Column::ApowerW.gt(threshold))
                    .add(power_logs::Column::ApowerW.eq(0.0)),
            )
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn query(&self, filter: &ReadingFilter) -> AppResult<Vec<Reading>> {
        let mut query = power_logs::Entity::find();

        if let Some(device_id) = &filter.device_id {
            query = query.filter(power_logs::Column::DeviceId.eq(device_id.as_str()));
        }
        if let Some(channel) = &filter.channel {
            query = query.filter(power_logs::Column::Channel.eq(channel.as_str()));
        }
        if let Some(start) = filter.start {
            query = query.filter(power_logs::Column::Timestamp.gte(start));
        }
        if let Some(end) = filter.end {
            query = query.filter(power_logs::Column::Timestamp.lte(end));
        }

        let rows = query
            .order_by_asc(power_logs::Column::DeviceId)
            .order_by_asc(power_logs::Column::Channel)
            .order_by_asc(power_logs::Column::Timestamp)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }

    async fn channels(&self) -> AppResult<Vec<(String, String)>> {
        let pairs = power_logs::Entity::find()
            .select_only()
            .column(power_logs::Column::DeviceId)
            .column(power_logs::Column::Channel)
            .distinct()
            .order_by_asc(power_logs::Column::DeviceId)
            .order_by_asc(power_logs::Column::Channel)
            .into_tuple::<(String, String)>()
            .all(&self.db)
            .await?;
        Ok(pairs)
    }
}
