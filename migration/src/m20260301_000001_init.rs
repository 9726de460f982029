use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== PUMP MODELS ==========
        manager
            .create_table(
                Table::create()
                    .table(PumpModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PumpModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PumpModels::Name).string_len(128).not_null())
                    .col(ColumnDef::new(PumpModels::PowerKw).double().not_null())
                    .col(ColumnDef::new(PumpModels::CurrentAmpere).double().not_null())
                    .col(ColumnDef::new(PumpModels::FlowRateHmt8).double())
                    .to_owned(),
            )
            .await?;

        // ========== POWER LOGS ==========
        manager
            .create_table(
                Table::create()
                    .table(PowerLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PowerLogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PowerLogs::DeviceId).string_len(128).not_null())
                    .col(ColumnDef::new(PowerLogs::Channel).string_len(64).not_null())
                    .col(ColumnDef::new(PowerLogs::ApowerW).double().not_null())
                    .col(ColumnDef::new(PowerLogs::VoltageV).double().not_null())
                    .col(ColumnDef::new(PowerLogs::CurrentA).double().not_null())
                    .col(ColumnDef::new(PowerLogs::EnergyTotalWh).double().not_null())
                    .col(
                        ColumnDef::new(PowerLogs::IdempotencyKey)
                            .string_len(256)
                            .unique_key(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PowerLogs::DeviceId)
                            .col(PowerLogs::Channel)
                            .col(PowerLogs::Timestamp),
                    )
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();

        // Window scans for cycle reconstruction
        db.execute_unprepared(
            "CREATE INDEX idx_power_logs_timestamp ON power_logs (timestamp DESC)",
        )
        .await?;

        // ========== DEVICE CONFIG VERSIONS ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceConfigVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceConfigVersions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceConfigVersions::DeviceId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceConfigVersions::Channel)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceConfigVersions::Version).integer().not_null())
                    .col(
                        ColumnDef::new(DeviceConfigVersions::EffectiveFrom)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceConfigVersions::EffectiveTo).date())
                    .col(ColumnDef::new(DeviceConfigVersions::ChannelName).string_len(128))
                    .col(ColumnDef::new(DeviceConfigVersions::PumpModelId).integer())
                    .col(ColumnDef::new(DeviceConfigVersions::FlowRate).double())
                    .col(
                        ColumnDef::new(DeviceConfigVersions::PumpType)
                            .string_len(16)
                            .not_null()
                            .default("relevage"),
                    )
                    .col(ColumnDef::new(DeviceConfigVersions::Dbo5).integer())
                    .col(ColumnDef::new(DeviceConfigVersions::Dco).integer())
                    .col(ColumnDef::new(DeviceConfigVersions::Mes).integer())
                    .col(
                        ColumnDef::new(DeviceConfigVersions::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_config_versions_pump_model")
                            .from(DeviceConfigVersions::Table, DeviceConfigVersions::PumpModelId)
                            .to(PumpModels::Table, PumpModels::Id),
                    )
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared(
            "ALTER TABLE device_config_versions ADD CONSTRAINT chk_config_versions_pump_type \
             CHECK (pump_type IN ('relevage', 'sortie', 'autre'))",
        )
        .await?;

        db.execute_unprepared(
            "ALTER TABLE device_config_versions ADD CONSTRAINT chk_config_versions_flow_rate \
             CHECK (flow_rate IS NULL OR flow_rate > 0)",
        )
        .await?;

        // At most one open version per (device, channel)
        db.execute_unprepared(
            "CREATE UNIQUE INDEX idx_config_versions_open ON device_config_versions \
             (device_id, channel) WHERE effective_to IS NULL",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_config_versions_key_from")
                    .table(DeviceConfigVersions::Table)
                    .col(DeviceConfigVersions::DeviceId)
                    .col(DeviceConfigVersions::Channel)
                    .col(DeviceConfigVersions::EffectiveFrom)
                    .to_owned(),
            )
            .await?;

        // ========== DEVICE CONFIG (current snapshot) ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceConfig::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DeviceConfig::DeviceId).string_len(128).not_null())
                    .col(ColumnDef::new(DeviceConfig::Channel).string_len(64).not_null())
                    .col(ColumnDef::new(DeviceConfig::DeviceName).string_len(128))
                    .col(ColumnDef::new(DeviceConfig::ChannelName).string_len(128))
                    .col(ColumnDef::new(DeviceConfig::PumpModelId).integer())
                    .col(ColumnDef::new(DeviceConfig::FlowRate).double())
                    .col(
                        ColumnDef::new(DeviceConfig::PumpType)
                            .string_len(16)
                            .not_null()
                            .default("relevage"),
                    )
                    .col(ColumnDef::new(DeviceConfig::Dbo5MgL).integer())
                    .col(ColumnDef::new(DeviceConfig::DcoMgL).integer())
                    .col(ColumnDef::new(DeviceConfig::MesMgL).integer())
                    .col(
                        ColumnDef::new(DeviceConfig::UpdatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .primary_key(
                        Index::create()
                            .col(DeviceConfig::DeviceId)
                            .col(DeviceConfig::Channel),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_config_pump_model")
                            .from(DeviceConfig::Table, DeviceConfig::PumpModelId)
                            .to(PumpModels::Table, PumpModels::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order of dependencies
        manager
            .drop_table(Table::drop().table(DeviceConfig::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(DeviceConfigVersions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(PowerLogs::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PumpModels::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum PumpModels {
    Table,
    Id,
    Name,
    PowerKw,
    CurrentAmpere,
    FlowRateHmt8,
}

#[derive(DeriveIden)]
enum PowerLogs {
    Table,
    Timestamp,
    DeviceId,
    Channel,
    ApowerW,
    VoltageV,
    CurrentA,
    EnergyTotalWh,
    IdempotencyKey,
}

#[derive(DeriveIden)]
enum DeviceConfigVersions {
    Table,
    Id,
    DeviceId,
    Channel,
    Version,
    EffectiveFrom,
    EffectiveTo,
    ChannelName,
    PumpModelId,
    FlowRate,
    PumpType,
    Dbo5,
    Dco,
    Mes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DeviceConfig {
    Table,
    DeviceId,
    Channel,
    DeviceName,
    ChannelName,
    PumpModelId,
    FlowRate,
    PumpType,
    Dbo5MgL,
    DcoMgL,
    MesMgL,
    UpdatedAt,
}
