//! Distance-based receiver sleep selection.
//!
//! The table is banded: the distance first selects the largest threshold it
//! has passed, then the remainder of the distance modulo that threshold is
//! looked up in ascending order. A receiver far from the target therefore
//! cycles through short and long sleeps as it approaches instead of sleeping
//! for the band's full interval near a band edge.

use crate::error::PolicyError;

/// One row of the sleep table.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SleepConfig {
    pub distance_threshold_km: f32,
    pub sleep_interval_secs: u32,
    pub receiver_power_enabled: bool,
}

impl SleepConfig {
    pub const fn new(
        distance_threshold_km: f32,
        sleep_interval_secs: u32,
        receiver_power_enabled: bool,
    ) -> Self {
        Self {
            distance_threshold_km,
            sleep_interval_secs,
            receiver_power_enabled,
        }
    }
}

/// What the receiver should do after a fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SleepDirective {
    pub sleep_interval_secs: u32,
    pub receiver_power_enabled: bool,
}

impl From<&SleepConfig> for SleepDirective {
    fn from(entry: &SleepConfig) -> Self {
        Self {
            sleep_interval_secs: entry.sleep_interval_secs,
            receiver_power_enabled: entry.receiver_power_enabled,
        }
    }
}

/// Validated view over a sleep table.
#[derive(Clone, Copy, Debug)]
pub struct SleepPolicy<'a> {
    table: &'a [SleepConfig],
}

impl<'a> SleepPolicy<'a> {
    /// Wrap `table`, checking it is non-empty with positive, strictly
    /// increasing thresholds.
    pub fn new(table: &'a [SleepConfig]) -> Result<Self, PolicyError> {
        let first = table.first().ok_or(PolicyError::EmptyTable)?;
        if !(first.distance_threshold_km.is_finite() && first.distance_threshold_km > 0.0) {
            return Err(PolicyError::UnorderedTable);
        }

        let increasing = table.windows(2).all(|pair| {
            pair[1].distance_threshold_km.is_finite()
                && pair[1].distance_threshold_km > pair[0].distance_threshold_km
        });
        if !increasing {
            return Err(PolicyError::UnorderedTable);
        }

        Ok(Self { table })
    }

    /// Threshold of the band `distance_km` falls in: the largest threshold
    /// not above it, or the smallest threshold when none is.
    pub fn band_threshold(&self, distance_km: f32) -> f32 {
        self.table
            .iter()
            .rev()
            .find(|entry| distance_km >= entry.distance_threshold_km)
            .unwrap_or(&self.table[0])
            .distance_threshold_km
    }

    /// Select the sleep interval and receiver power for `distance_km`.
    pub fn select(&self, distance_km: f32) -> Result<SleepDirective, PolicyError> {
        if !distance_km.is_finite() {
            return Err(PolicyError::NonFiniteDistance);
        }
        if distance_km < 0.0 {
            return Err(PolicyError::NegativeDistance);
        }

        let band = self.band_threshold(distance_km);
        let residual = distance_km % band;

        // The residual is strictly below `band`, which is in the table, so a
        // row always matches. The last row is kept as a fallback for float
        // edge cases.
        let entry = self
            .table
            .iter()
            .find(|entry| entry.distance_threshold_km >= residual)
            .unwrap_or(&self.table[self.table.len() - 1]);

        Ok(entry.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SLEEP_TABLE;

    fn policy() -> SleepPolicy<'static> {
        SleepPolicy::new(&SLEEP_TABLE).unwrap()
    }

    fn directive(secs: u32, on: bool) -> SleepDirective {
        SleepDirective {
            sleep_interval_secs: secs,
            receiver_power_enabled: on,
        }
    }

    #[test]
    fn band_selection() {
        let p = policy();
        assert_eq!(p.band_threshold(0.0), 10.0);
        assert_eq!(p.band_threshold(9.99), 10.0);
        assert_eq!(p.band_threshold(10.0), 10.0);
        assert_eq!(p.band_threshold(49.0), 10.0);
        assert_eq!(p.band_threshold(50.0), 50.0);
        assert_eq!(p.band_threshold(150.0), 100.0);
        assert_eq!(p.band_threshold(5_000.0), 200.0);
    }

    #[test]
    fn inside_smallest_band_is_always_on() {
        let p = policy();
        for step in 0..1000 {
            let d = step as f32 * 0.01;
            assert!(p.select(d).unwrap().receiver_power_enabled, "d = {}", d);
        }
    }

    #[test]
    fn ten_to_fifty_stays_on() {
        // Band 10 km: the remainder never exceeds the first threshold.
        let p = policy();
        assert_eq!(p.select(10.0).unwrap(), directive(0, true));
        assert_eq!(p.select(27.5).unwrap(), directive(0, true));
        assert_eq!(p.select(49.9).unwrap(), directive(0, true));
    }

    #[test]
    fn fifty_band_cycles_between_on_and_short_sleep() {
        let p = policy();
        assert_eq!(p.select(55.0).unwrap(), directive(0, true));
        assert_eq!(p.select(60.0).unwrap(), directive(0, true));
        assert_eq!(p.select(75.0).unwrap(), directive(300, false));
        assert_eq!(p.select(99.0).unwrap(), directive(300, false));
    }

    #[test]
    fn hundred_band() {
        let p = policy();
        assert_eq!(p.select(100.0).unwrap(), directive(0, true));
        assert_eq!(p.select(130.0).unwrap(), directive(300, false));
        assert_eq!(p.select(199.0).unwrap(), directive(600, false));
    }

    #[test]
    fn far_band_uses_every_row() {
        let p = policy();
        assert_eq!(p.select(205.0).unwrap(), directive(0, true));
        assert_eq!(p.select(240.0).unwrap(), directive(300, false));
        assert_eq!(p.select(290.0).unwrap(), directive(600, false));
        assert_eq!(p.select(350.0).unwrap(), directive(900, false));
        assert_eq!(p.select(1_190.0).unwrap(), directive(900, false));
    }

    #[test]
    fn every_interval_comes_from_the_table() {
        let p = policy();
        for step in 0..20_000 {
            let d = step as f32 * 0.37;
            let selected = p.select(d).unwrap();
            assert!(
                SLEEP_TABLE
                    .iter()
                    .any(|row| SleepDirective::from(row) == selected),
                "d = {} gave {:?}",
                d,
                selected
            );
        }
    }

    #[test]
    fn rejects_bad_distances() {
        let p = policy();
        assert_eq!(p.select(-0.5), Err(PolicyError::NegativeDistance));
        assert_eq!(p.select(f32::NAN), Err(PolicyError::NonFiniteDistance));
        assert_eq!(p.select(f32::INFINITY), Err(PolicyError::NonFiniteDistance));
    }

    #[test]
    fn rejects_malformed_tables() {
        assert_eq!(SleepPolicy::new(&[]).unwrap_err(), PolicyError::EmptyTable);

        let unordered = [SleepConfig::new(50.0, 0, true), SleepConfig::new(10.0, 60, false)];
        assert_eq!(
            SleepPolicy::new(&unordered).unwrap_err(),
            PolicyError::UnorderedTable
        );

        let zero = [SleepConfig::new(0.0, 0, true)];
        assert_eq!(SleepPolicy::new(&zero).unwrap_err(), PolicyError::UnorderedTable);
    }
}
