//! Temperature to fan duty mapping and the manual override flag

use crate::config::FanConfig;
use crate::errors::Result;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Fan stopped
pub const FAN_DUTY_OFF: f32 = 0.0;
/// Fan at full speed
pub const FAN_DUTY_FULL: f32 = 1.0;

/// One step of the threshold table
#[derive(Debug, Clone, PartialEq)]
pub struct FanLevel {
    pub name: &'static str,
    pub threshold: f32,
    pub duty: f32,
}

/// Fan levels, ordered highest first
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    levels: Vec<FanLevel>,
}

impl ThresholdTable {
    /// Build the four levels from the configured thresholds
    pub fn from_config(fan: &FanConfig) -> Self {
        Self {
            levels: vec![
                FanLevel { name: "lv3", threshold: fan.lv3, duty: 1.0 },
                FanLevel { name: "lv2", threshold: fan.lv2, duty: 0.75 },
                FanLevel { name: "lv1", threshold: fan.lv1, duty: 0.5 },
                FanLevel { name: "lv0", threshold: fan.lv0, duty: 0.25 },
            ],
        }
    }

    /// Levels in lookup order, highest threshold first
    pub fn levels(&self) -> &[FanLevel] {
        &self.levels
    }

    /// The first level, highest first, whose threshold has been reached
    pub fn level_for(&self, temp_celsius: f32) -> Option<&FanLevel> {
        self.levels.iter().find(|level| temp_celsius >= level.threshold)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::from_config(&FanConfig::default())
    }
}

/// Fan speed fraction for a temperature: the duty of the first matching
/// level, or off when the temperature is below every threshold.
pub fn duty_for(temp_celsius: f32, table: &ThresholdTable) -> f32 {
    table
        .level_for(temp_celsius)
        .map_or(FAN_DUTY_OFF, |level| level.duty)
}

/// Manual "full speed" override shared between the dispatcher and the fan loop
#[derive(Debug, Default)]
pub struct FanOverride {
    enabled: AtomicBool,
    changed: Notify,
}

impl FanOverride {
    /// Create the override in the given state
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            changed: Notify::new(),
        }
    }

    /// Whether the fan is forced to full speed
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the override and return the new state
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::AcqRel);
        self.changed.notify_one();
        enabled
    }

    /// Resolves after the next toggle
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

/// Keeps the last known duty across failed temperature reads
#[derive(Debug, Clone)]
pub struct FanGovernor {
    table: ThresholdTable,
    last_duty: Option<f32>,
}

impl FanGovernor {
    /// Create a governor with no reading yet
    pub fn new(table: ThresholdTable) -> Self {
        Self {
            table,
            last_duty: None,
        }
    }

    /// Feed a temperature reading. A failed read keeps the previous duty.
    pub fn update(&mut self, reading: Result<f32>) -> Option<f32> {
        match reading {
            Ok(temp) => {
                let duty = duty_for(temp, &self.table);
                debug!("t = {:.1}°C -> duty {:.2}", temp, duty);
                self.last_duty = Some(duty);
            }
            Err(e) => warn!(
                "Temperature unavailable ({}), keeping duty {:?}",
                e, self.last_duty
            ),
        }
        self.last_duty
    }

    /// Duty from the last successful reading, if any
    pub fn last_duty(&self) -> Option<f32> {
        self.last_duty
    }

    /// Duty to drive right now. Until a reading has succeeded the fan runs
    /// at full speed.
    pub fn effective_duty(&self, override_enabled: bool) -> f32 {
        if override_enabled {
            FAN_DUTY_FULL
        } else {
            self.last_duty.unwrap_or(FAN_DUTY_FULL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HatError;

    #[test]
    fn threshold_scenario() {
        let table = ThresholdTable::default();
        assert_eq!(duty_for(42.0, &table), 0.5);
        assert_eq!(duty_for(30.0, &table), 0.0);
        assert_eq!(duty_for(35.0, &table), 0.25);
        assert_eq!(duty_for(45.0, &table), 0.75);
        assert_eq!(duty_for(50.0, &table), 1.0);
        assert_eq!(duty_for(90.0, &table), 1.0);
        assert_eq!(table.level_for(42.0).map(|l| l.name), Some("lv1"));
    }

    #[test]
    fn duty_is_monotonic_in_temperature() {
        let tables = [
            ThresholdTable::default(),
            ThresholdTable::from_config(&FanConfig {
                lv0: 40.0,
                lv1: 30.0,
                lv2: 55.0,
                lv3: 50.0,
                ..FanConfig::default()
            }),
        ];
        for table in &tables {
            let mut previous = duty_for(-40.0, table);
            let mut temp = -40.0;
            while temp <= 120.0 {
                let duty = duty_for(temp, table);
                assert!(duty >= previous, "{} dropped at {}", duty, temp);
                assert!((0.0..=1.0).contains(&duty));
                previous = duty;
                temp += 0.25;
            }
        }
    }

    #[test]
    fn toggle_flips_and_reports_new_state() {
        let flag = FanOverride::new(false);
        assert!(flag.toggle());
        assert!(flag.is_enabled());
        assert!(!flag.toggle());
        assert!(!flag.is_enabled());
    }

    #[tokio::test]
    async fn toggle_wakes_a_waiter() {
        let flag = std::sync::Arc::new(FanOverride::new(false));
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.changed().await })
        };
        flag.toggle();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn governor_keeps_last_duty_on_read_failure() {
        let mut governor = FanGovernor::new(ThresholdTable::default());
        assert_eq!(governor.effective_duty(false), FAN_DUTY_FULL);

        assert_eq!(governor.update(Ok(46.0)), Some(0.75));
        assert_eq!(
            governor.update(Err(HatError::metric("temperature", "gone"))),
            Some(0.75)
        );
        assert_eq!(governor.effective_duty(false), 0.75);
        assert_eq!(governor.effective_duty(true), FAN_DUTY_FULL);

        assert_eq!(governor.update(Ok(20.0)), Some(FAN_DUTY_OFF));
        assert_eq!(governor.effective_duty(false), FAN_DUTY_OFF);
    }
}
