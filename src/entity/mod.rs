pub mod device_config;
pub mod device_config_versions;
pub mod power_logs;
pub mod pump_models;
