//! Pure version-chain logic shared by the database store and the in-memory chain.
//!
//! A channel's versions form a partition of the calendar from the first
//! `effective_from` onwards: intervals never overlap, leave no gaps, and only
//! the last one is open.

use chrono::{Days, NaiveDate, Utc};

use crate::versions::model::{ConfigFields, ConfigPatch, ConfigVersion, VersionError};

/// Version valid on `date`, if any.
///
/// Should overlapping rows ever exist, the highest version wins.
#[must_use]
pub fn resolve(versions: &[ConfigVersion], date: NaiveDate) -> Option<&ConfigVersion> {
    versions
        .iter()
        .filter(|v| v.covers(date))
        .max_by_key(|v| v.version)
}

/// The open version, if any.
#[must_use]
pub fn current(versions: &[ConfigVersion]) -> Option<&ConfigVersion> {
    versions
        .iter()
        .filter(|v| v.is_open())
        .max_by_key(|v| v.version)
}

/// Version row to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub version: i32,
    pub effective_from: NaiveDate,
    pub fields: ConfigFields,
}

/// Mutations that move a chain to its next state.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPlan {
    /// Versions starting on or after the new date, superseded entirely
    pub deletes: Vec<i32>,
    /// Versions cut short: (id, new last day)
    pub closes: Vec<(i32, NaiveDate)>,
    pub insert: NewVersion,
}

/// Plan a new version of a channel's configuration starting on `effective_from`.
///
/// Every version reaching `effective_from` or later is either deleted (when it
/// starts on or after that day) or closed the day before. With an open version
/// starting earlier this closes it and appends; with one starting on or after
/// the date it is a correction that replaces it. The new version inherits the
/// open version's fields for everything the patch leaves out.
///
/// # Errors
///
/// Returns a `VersionError` when the patch is invalid.
pub fn plan_set_version(
    existing: &[ConfigVersion],
    effective_from: NaiveDate,
    patch: &ConfigPatch,
) -> Result<VersionPlan, VersionError> {
    let fields = patch.merge(current(existing).map(|v| &v.fields))?;
    let version = existing.iter().map(|v| v.version).max().unwrap_or(0) + 1;
    let day_before = effective_from.checked_sub_days(Days::new(1));

    let mut deletes = Vec::new();
    let mut closes = Vec::new();

    for v in existing {
        if v.effective_to.is_some_and(|to| to < effective_from) {
            continue;
        }
        match day_before {
            Some(last_day) if v.effective_from < effective_from => closes.push((v.id, last_day)),
            _ => deletes.push(v.id),
        }
    }

    Ok(VersionPlan {
        deletes,
        closes,
        insert: NewVersion {
            version,
            effective_from,
            fields,
        },
    })
}

/// Check that `versions` (one channel) form a gap-free, non-overlapping
/// partition with at most one open version, which comes last.
///
/// # Errors
///
/// Returns a description of the first violation found.
pub fn check_partition(versions: &[ConfigVersion]) -> Result<(), String> {
    let mut sorted: Vec<&ConfigVersion> = versions.iter().collect();
    sorted.sort_by_key(|v| v.effective_from);

    for v in &sorted {
        if v.effective_to.is_some_and(|to| to < v.effective_from) {
            return Err(format!("v{} ends before it starts", v.version));
        }
    }

    for pair in sorted.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let Some(prev_to) = prev.effective_to else {
            return Err(format!(
                "v{} is open but v{} starts after it",
                prev.version, next.version
            ));
        };
        if prev_to.checked_add_days(Days::new(1)) != Some(next.effective_from) {
            return Err(format!(
                "v{} ends {} but v{} starts {}",
                prev.version, prev_to, next.version, next.effective_from
            ));
        }
    }

    Ok(())
}

/// In-memory version chain of one channel, applying the same plans as the
/// database store.
#[derive(Debug, Clone)]
pub struct VersionChain {
    device_id: String,
    channel: String,
    versions: Vec<ConfigVersion>,
    next_id: i32,
}

impl VersionChain {
    #[must_use]
    pub fn new(device_id: &str, channel: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            channel: channel.to_string(),
            versions: Vec::new(),
            next_id: 1,
        }
    }

    /// Versions ordered by `effective_from`.
    #[must_use]
    pub fn versions(&self) -> &[ConfigVersion] {
        &self.versions
    }

    #[must_use]
    pub fn current(&self) -> Option<&ConfigVersion> {
        current(&self.versions)
    }

    #[must_use]
    pub fn resolve(&self, date: NaiveDate) -> Option<&ConfigVersion> {
        resolve(&self.versions, date)
    }

    /// Start a new version on `effective_from`.
    ///
    /// # Errors
    ///
    /// Returns a `VersionError` when the patch is invalid.
    pub fn set_version(
        &mut self,
        effective_from: NaiveDate,
        patch: &ConfigPatch,
    ) -> Result<&ConfigVersion, VersionError> {
        let plan = plan_set_version(&self.versions, effective_from, patch)?;

        self.versions.retain(|v| !plan.deletes.contains(&v.id));
        for (id, last_day) in &plan.closes {
            if let Some(v) = self.versions.iter_mut().find(|v| v.id == *id) {
                v.effective_to = Some(*last_day);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.versions.push(ConfigVersion {
            id,
            device_id: self.device_id.clone(),
            channel: self.channel.clone(),
            version: plan.insert.version,
            effective_from: plan.insert.effective_from,
            effective_to: None,
            fields: plan.insert.fields,
            created_at: Some(Utc::now()),
        });
        self.versions.sort_by_key(|v| v.effective_from);

        self.versions
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| self.no_current())
    }

    /// Edit the open version in place.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::NoCurrentVersion` when the chain has no open
    /// version, or a validation error for an invalid patch.
    pub fn update_current(&mut self, patch: &ConfigPatch) -> Result<&ConfigVersion, VersionError> {
        let missing = self.no_current();
        let open = self
            .versions
            .iter_mut()
            .filter(|v| v.is_open())
            .max_by_key(|v| v.version)
            .ok_or(missing)?;
        open.fields = patch.merge(Some(&open.fields))?;
        Ok(open)
    }

    fn no_current(&self) -> VersionError {
        VersionError::NoCurrentVersion {
            device_id: self.device_id.clone(),
            channel: self.channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn flow(rate: f64) -> ConfigPatch {
        ConfigPatch {
            flow_rate: Some(rate),
            ..Default::default()
        }
    }

    #[test]
    fn first_version_is_open() {
        let mut chain = VersionChain::new("dev", "switch:0");
        let v = chain.set_version(day("2026-01-01"), &flow(10.0)).unwrap();
        assert_eq!(v.version, 1);
        assert!(v.is_open());
        assert!(chain.resolve(day("2025-12-31")).is_none());
        assert_eq!(chain.resolve(day("2030-01-01")).unwrap().version, 1);
    }

    #[test]
    fn correction_replaces_open_version() {
        let mut chain = VersionChain::new("dev", "switch:0");
        chain.set_version(day("2026-01-01"), &flow(10.0)).unwrap();
        chain.set_version(day("2026-01-01"), &flow(11.0)).unwrap();

        assert_eq!(chain.versions().len(), 1);
        let current = chain.current().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.fields.flow_rate, Some(11.0));
        check_partition(chain.versions()).unwrap();
    }

    #[test]
    fn backdated_correction_trims_earlier_versions() {
        let mut chain = VersionChain::new("dev", "switch:0");
        chain.set_version(day("2026-01-01"), &flow(10.0)).unwrap();
        chain.set_version(day("2026-02-01"), &flow(12.0)).unwrap();
        chain.set_version(day("2026-03-01"), &flow(14.0)).unwrap();

        chain.set_version(day("2026-01-15"), &flow(9.0)).unwrap();

        check_partition(chain.versions()).unwrap();
        assert_eq!(chain.versions().len(), 2);
        assert_eq!(
            chain.resolve(day("2026-01-14")).unwrap().effective_to,
            Some(day("2026-01-14"))
        );
        assert_eq!(chain.resolve(day("2026-02-10")).unwrap().fields.flow_rate, Some(9.0));
    }

    #[test]
    fn update_current_needs_an_open_version() {
        let mut chain = VersionChain::new("dev", "switch:0");
        assert!(matches!(
            chain.update_current(&flow(5.0)),
            Err(VersionError::NoCurrentVersion { .. })
        ));

        chain.set_version(day("2026-01-01"), &flow(10.0)).unwrap();
        let updated = chain.update_current(&flow(5.0)).unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.fields.flow_rate, Some(5.0));
    }

    #[test]
    fn partition_check_spots_gaps_and_overlaps() {
        let mut chain = VersionChain::new("dev", "switch:0");
        chain.set_version(day("2026-01-01"), &flow(10.0)).unwrap();
        chain.set_version(day("2026-02-01"), &flow(12.0)).unwrap();

        let mut gap = chain.versions().to_vec();
        gap[0].effective_to = Some(day("2026-01-20"));
        assert!(check_partition(&gap).is_err());

        let mut overlap = chain.versions().to_vec();
        overlap[0].effective_to = Some(day("2026-02-05"));
        assert!(check_partition(&overlap).is_err());

        let mut two_open = chain.versions().to_vec();
        two_open[0].effective_to = None;
        assert!(check_partition(&two_open).is_err());
    }
}
