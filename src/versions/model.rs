use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::entity::device_config_versions;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VersionError {
    #[error("Flow rate must be positive, got {0}")]
    InvalidFlowRate(f64),

    #[error("Invalid pump type '{0}', expected one of: relevage, sortie, autre")]
    InvalidPumpType(String),

    #[error("{field} must not be negative, got {value}")]
    NegativeQuality { field: &'static str, value: i32 },

    #[error("No current configuration for {device_id}/{channel}")]
    NoCurrentVersion { device_id: String, channel: String },
}

/// Role of the pump on the treatment line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PumpType {
    /// Lift pump feeding the filter
    #[default]
    Relevage,
    /// Outlet pump
    Sortie,
    Autre,
}

impl PumpType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevage => "relevage",
            Self::Sortie => "sortie",
            Self::Autre => "autre",
        }
    }
}

impl FromStr for PumpType {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevage" => Ok(Self::Relevage),
            "sortie" => Ok(Self::Sortie),
            "autre" => Ok(Self::Autre),
            other => Err(VersionError::InvalidPumpType(other.to_string())),
        }
    }
}

impl fmt::Display for PumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business attributes carried by one configuration version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ConfigFields {
    pub channel_name: Option<String>,
    pub pump_model_id: Option<i32>,
    /// Nominal flow rate in m³/h
    pub flow_rate: Option<f64>,
    pub pump_type: PumpType,
    /// Water quality in mg/L
    pub dbo5: Option<i32>,
    pub dco: Option<i32>,
    pub mes: Option<i32>,
}

/// Partial update of [`ConfigFields`]. Absent fields are inherited.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ConfigPatch {
    pub channel_name: Option<String>,
    pub pump_model_id: Option<i32>,
    pub flow_rate: Option<f64>,
    pub pump_type: Option<String>,
    pub dbo5: Option<i32>,
    pub dco: Option<i32>,
    pub mes: Option<i32>,
}

impl ConfigPatch {
    /// Check the provided fields.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<Option<PumpType>, VersionError> {
        if let Some(flow) = self.flow_rate
            && !(flow.is_finite() && flow > 0.0)
        {
            return Err(VersionError::InvalidFlowRate(flow));
        }
        for (field, value) in [("dbo5", self.dbo5), ("dco", self.dco), ("mes", self.mes)] {
            if let Some(value) = value
                && value < 0
            {
                return Err(VersionError::NegativeQuality { field, value });
            }
        }
        self.pump_type.as_deref().map(str::parse::<PumpType>).transpose()
    }

    /// Overlay this patch on `base`, or on the defaults when there is none.
    ///
    /// # Errors
    ///
    /// Returns a `VersionError` when the patch is invalid.
    pub fn merge(&self, base: Option<&ConfigFields>) -> Result<ConfigFields, VersionError> {
        let pump_type = self.validate()?;
        let base = base.cloned().unwrap_or_default();
        Ok(ConfigFields {
            channel_name: self.channel_name.clone().or(base.channel_name),
            pump_model_id: self.pump_model_id.or(base.pump_model_id),
            flow_rate: self.flow_rate.or(base.flow_rate),
            pump_type: pump_type.unwrap_or(base.pump_type),
            dbo5: self.dbo5.or(base.dbo5),
            dco: self.dco.or(base.dco),
            mes: self.mes.or(base.mes),
        })
    }
}

/// One epoch of a channel's configuration.
///
/// `effective_to` is the last day the version applies to; `None` marks the
/// open (current) version.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConfigVersion {
    pub id: i32,
    pub device_id: String,
    pub channel: String,
    pub version: i32,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    #[serde(flatten)]
    pub fields: ConfigFields,
    pub created_at: Option<DateTime<Utc>>,
}

impl ConfigVersion {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.effective_to.is_none()
    }

    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| date <= to)
    }
}

impl From<device_config_versions::Model> for ConfigVersion {
    fn from(row: device_config_versions::Model) -> Self {
        Self {
            id: row.id,
            device_id: row.device_id,
            channel: row.channel,
            version: row.version,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
            fields: ConfigFields {
                channel_name: row.channel_name,
                pump_model_id: row.pump_model_id,
                flow_rate: row.flow_rate,
                // The column carries a CHECK constraint; anything else is a legacy row.
                pump_type: row.pump_type.parse().unwrap_or_default(),
                dbo5: row.dbo5,
                dco: row.dco,
                mes: row.mes,
            },
            created_at: row.created_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}
