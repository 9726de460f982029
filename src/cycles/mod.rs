//! Cycle reconstruction from stored readings, and the volume/CO2e figures
//! derived from it.

pub mod detector;
pub mod impact;
pub mod report;

pub use detector::{Cycle, reconstruct};
pub use impact::{Co2eImpact, ImpactError, MethaneBalance, co2e_impact, round_to, volume_m3};
pub use report::{CycleReport, ReportFilters, VersionIndex, build_report};
