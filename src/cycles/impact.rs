use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ImpactConfig;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ImpactError {
    #[error("Duration cannot be negative: {0} min")]
    NegativeDuration(f64),
}

/// Round half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Volume pumped at `flow_rate_m3_h` during `duration_minutes`, in m³ (3 decimals).
///
/// # Errors
///
/// Returns `ImpactError::NegativeDuration` for a negative duration.
pub fn volume_m3(flow_rate_m3_h: f64, duration_minutes: f64) -> Result<f64, ImpactError> {
    if duration_minutes < 0.0 {
        return Err(ImpactError::NegativeDuration(duration_minutes));
    }
    if duration_minutes == 0.0 {
        return Ok(0.0);
    }
    Ok(round_to(flow_rate_m3_h * duration_minutes / 60.0, 3))
}

/// CH4 that the treated effluent would have produced in a septic pit versus
/// the planted filter actually used.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MethaneBalance {
    pub ch4_fosse_kg: f64,
    pub ch4_fpv_kg: f64,
}

impl MethaneBalance {
    #[must_use]
    pub fn for_effluent(volume_m3: f64, dbo5_mg_l: f64, factors: &ImpactConfig) -> Self {
        if volume_m3 <= 0.0 || dbo5_mg_l <= 0.0 {
            return Self::default();
        }
        let dbo5_mass_kg = volume_m3 * dbo5_mg_l / 1000.0;
        Self {
            ch4_fosse_kg: dbo5_mass_kg * factors.bo_factor * factors.mcf_fosse,
            ch4_fpv_kg: dbo5_mass_kg * factors.bo_factor * factors.mcf_fpv,
        }
    }

    #[must_use]
    pub fn ch4_avoided_kg(&self) -> f64 {
        self.ch4_fosse_kg - self.ch4_fpv_kg
    }

    #[must_use]
    pub fn impact(&self, gwp_ch4: f64) -> Co2eImpact {
        let avoided = self.ch4_avoided_kg();
        let reduction = if self.ch4_fosse_kg > 0.0 {
            avoided / self.ch4_fosse_kg * 100.0
        } else {
            0.0
        };
        Co2eImpact {
            co2e_avoided_kg: round_to(avoided * gwp_ch4, 2),
            reduction_percent: round_to(reduction, 1),
            ch4_avoided_kg: round_to(avoided, 2),
        }
    }
}

impl std::ops::AddAssign for MethaneBalance {
    fn add_assign(&mut self, other: Self) {
        self.ch4_fosse_kg += other.ch4_fosse_kg;
        self.ch4_fpv_kg += other.ch4_fpv_kg;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct Co2eImpact {
    pub co2e_avoided_kg: f64,
    pub reduction_percent: f64,
    pub ch4_avoided_kg: f64,
}

/// CO2e avoided by treating `volume_m3` of effluent at `dbo5_mg_l`.
#[must_use]
pub fn co2e_impact(volume_m3: f64, dbo5_mg_l: f64, factors: &ImpactConfig) -> Co2eImpact {
    MethaneBalance::for_effluent(volume_m3, dbo5_mg_l, factors).impact(factors.gwp_ch4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(9.06, 1), 9.1);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }

    #[test]
    fn methane_balances_add_up() {
        let factors = ImpactConfig::default();
        let mut total = MethaneBalance::for_effluent(1.0, 570.0, &factors);
        total += MethaneBalance::for_effluent(2.0, 570.0, &factors);
        let single = MethaneBalance::for_effluent(3.0, 570.0, &factors);
        assert!((total.ch4_avoided_kg() - single.ch4_avoided_kg()).abs() < 1e-9);
    }
}
