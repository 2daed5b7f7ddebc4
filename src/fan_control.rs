//! PWM fan output and the periodic fan loop

use crate::config::{PwmBackend, PwmConfig};
use crate::errors::{HatError, Result};
use crate::fan::{FanGovernor, FanOverride};
use crate::metrics::TemperatureSource;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Something that can drive the fan at a duty fraction
pub trait FanOutput {
    fn set_duty(&mut self, duty: f32) -> Result<()>;
}

/// Where the PWM lives
#[derive(Debug, Clone, PartialEq)]
pub enum PwmTarget {
    /// hwmon `pwmN` file taking 0-255
    Hwmon { pwm_path: PathBuf },
    /// sysfs pwm channel directory with `period`, `duty_cycle` and `enable`
    PwmChip { channel_dir: PathBuf, period_ns: u32 },
}

/// Fan controller writing sysfs PWM files
pub struct FanController {
    target: PwmTarget,
    last_written: Option<u32>,
}

impl FanController {
    /// Create a controller; call `initialize` before writing duties
    pub fn new(target: PwmTarget) -> Self {
        Self {
            target,
            last_written: None,
        }
    }

    /// Build a controller from configuration, detecting a hwmon PWM device
    /// when no path is given
    pub fn from_config(pwm: &PwmConfig) -> Result<Self> {
        let target = match (pwm.backend, &pwm.path) {
            (PwmBackend::Hwmon, Some(path)) => PwmTarget::Hwmon {
                pwm_path: path.clone(),
            },
            (PwmBackend::Hwmon, None) => PwmTarget::Hwmon {
                pwm_path: find_hwmon_pwm(Path::new("/sys/class/hwmon"))?,
            },
            (PwmBackend::PwmChip, Some(path)) => PwmTarget::PwmChip {
                channel_dir: path.clone(),
                period_ns: pwm.period_ns,
            },
            (PwmBackend::PwmChip, None) => {
                return Err(HatError::Config(
                    "pwm.path is required for the pwmchip backend".to_string(),
                ))
            }
        };

        let mut controller = Self::new(target);
        controller.initialize()?;
        Ok(controller)
    }

    /// The PWM device being driven
    pub fn target(&self) -> &PwmTarget {
        &self.target
    }

    /// Put the PWM into manual mode
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing fan controller: {:?}", self.target);
        match &self.target {
            PwmTarget::Hwmon { pwm_path } => {
                let enable = enable_path(pwm_path);
                if enable.exists() {
                    fs::write(&enable, "1")?;
                }
            }
            PwmTarget::PwmChip {
                channel_dir,
                period_ns,
            } => {
                fs::write(channel_dir.join("period"), period_ns.to_string())?;
                fs::write(channel_dir.join("duty_cycle"), "0")?;
                fs::write(channel_dir.join("enable"), "1")?;
            }
        }
        Ok(())
    }

    /// Raw register value for a duty fraction
    pub fn raw_value(&self, duty: f32) -> u32 {
        let duty = duty.clamp(0.0, 1.0);
        match &self.target {
            PwmTarget::Hwmon { .. } => (duty * 255.0).round() as u32,
            PwmTarget::PwmChip { period_ns, .. } => (duty * *period_ns as f32).round() as u32,
        }
    }

    fn value_path(&self) -> PathBuf {
        match &self.target {
            PwmTarget::Hwmon { pwm_path } => pwm_path.clone(),
            PwmTarget::PwmChip { channel_dir, .. } => channel_dir.join("duty_cycle"),
        }
    }
}

impl FanOutput for FanController {
    fn set_duty(&mut self, duty: f32) -> Result<()> {
        let raw = self.raw_value(duty);
        if self.last_written == Some(raw) {
            return Ok(());
        }

        let path = self.value_path();
        fs::write(&path, raw.to_string())
            .map_err(|e| HatError::Fan(format!("{}: {}", path.display(), e)))?;
        self.last_written = Some(raw);

        debug!("Set fan PWM to {} ({:.0}%)", raw, duty * 100.0);
        Ok(())
    }
}

/// Stand-in when no PWM device exists: only logs the duty it would apply
#[derive(Debug, Default)]
pub struct DryRunFan {
    last: Option<f32>,
}

impl FanOutput for DryRunFan {
    fn set_duty(&mut self, duty: f32) -> Result<()> {
        if self.last != Some(duty) {
            info!("Fan duty {:.0}% (no PWM device)", duty * 100.0);
            self.last = Some(duty);
        }
        Ok(())
    }
}

impl<F: FanOutput + ?Sized> FanOutput for Box<F> {
    fn set_duty(&mut self, duty: f32) -> Result<()> {
        (**self).set_duty(duty)
    }
}

fn enable_path(pwm_path: &Path) -> PathBuf {
    let mut name = pwm_path.as_os_str().to_os_string();
    name.push("_enable");
    PathBuf::from(name)
}

/// First `pwmN` file (N = 1..4) under any hwmon device
pub fn find_hwmon_pwm(hwmon_dir: &Path) -> Result<PathBuf> {
    if !hwmon_dir.exists() {
        return Err(HatError::Config(
            "Hardware monitoring directory not found".to_string(),
        ));
    }

    let mut devices: Vec<PathBuf> = fs::read_dir(hwmon_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    devices.sort();

    for device in devices {
        for i in 1..=4 {
            let pwm = device.join(format!("pwm{}", i));
            if pwm.exists() {
                return Ok(pwm);
            }
        }
    }

    Err(HatError::Config(format!(
        "No PWM files found under {}",
        hwmon_dir.display()
    )))
}

/// Sample the temperature every `period` and drive the fan.
///
/// Override toggles apply immediately instead of waiting for the next sample.
/// Never returns; a failed temperature read keeps the previous duty and a
/// failed write is logged and retried on the next pass.
pub async fn run_fan_loop<T, F>(
    thermal: T,
    mut output: F,
    mut governor: FanGovernor,
    fan_override: &FanOverride,
    period: Duration,
) where
    T: TemperatureSource,
    F: FanOutput,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                governor.update(thermal.read_temperature());
            }
            _ = fan_override.changed() => {
                debug!("fan override now {}", fan_override.is_enabled());
            }
        }

        let duty = governor.effective_duty(fan_override.is_enabled());
        if let Err(e) = output.set_duty(duty) {
            warn!("Failed to set fan duty: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::ThresholdTable;
    use std::sync::{Arc, Mutex};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("penta_monitor_fan_test")
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn hwmon_writes_scaled_values_once() {
        let dir = temp_dir("hwmon");
        let pwm = dir.join("pwm1");
        fs::write(&pwm, "0").unwrap();
        fs::write(dir.join("pwm1_enable"), "2").unwrap();

        let mut fan = FanController::new(PwmTarget::Hwmon {
            pwm_path: pwm.clone(),
        });
        fan.initialize().unwrap();
        assert_eq!(fs::read_to_string(dir.join("pwm1_enable")).unwrap(), "1");

        fan.set_duty(0.5).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "128");

        // unchanged duty is not rewritten
        fs::write(&pwm, "marker").unwrap();
        fan.set_duty(0.5).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "marker");

        fan.set_duty(1.0).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "255");
    }

    #[test]
    fn pwmchip_uses_period_nanoseconds() {
        let dir = temp_dir("pwmchip");
        let mut fan = FanController::new(PwmTarget::PwmChip {
            channel_dir: dir.clone(),
            period_ns: 40_000,
        });
        fan.initialize().unwrap();
        assert_eq!(fs::read_to_string(dir.join("period")).unwrap(), "40000");
        assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "1");

        fan.set_duty(0.25).unwrap();
        assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "10000");
    }

    #[test]
    fn detects_first_pwm_file() {
        let dir = temp_dir("detect");
        fs::create_dir_all(dir.join("hwmon0")).unwrap();
        fs::create_dir_all(dir.join("hwmon1")).unwrap();
        fs::write(dir.join("hwmon1").join("pwm2"), "0").unwrap();

        assert_eq!(find_hwmon_pwm(&dir).unwrap(), dir.join("hwmon1").join("pwm2"));
        assert!(find_hwmon_pwm(&dir.join("hwmon0")).is_err());
        assert!(find_hwmon_pwm(&dir.join("missing")).is_err());
    }

    #[test]
    fn pwmchip_without_path_is_a_config_error() {
        let pwm = PwmConfig {
            backend: PwmBackend::PwmChip,
            path: None,
            period_ns: 40_000,
        };
        assert!(matches!(
            FanController::from_config(&pwm),
            Err(HatError::Config(_))
        ));
    }

    /// Temperature source replaying a script, then failing
    struct ScriptedThermal(Mutex<Vec<f32>>);

    impl TemperatureSource for ScriptedThermal {
        fn read_temperature(&self) -> Result<f32> {
            let mut readings = self.0.lock().unwrap();
            if readings.is_empty() {
                Err(HatError::metric("temperature", "sensor gone"))
            } else {
                Ok(readings.remove(0))
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingFan(Arc<Mutex<Vec<f32>>>);

    impl FanOutput for RecordingFan {
        fn set_duty(&mut self, duty: f32) -> Result<()> {
            self.0.lock().unwrap().push(duty);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loop_samples_keeps_last_duty_and_honours_override() {
        let fan = RecordingFan::default();
        let fan_override = Arc::new(FanOverride::new(false));
        let thermal = ScriptedThermal(Mutex::new(vec![42.0, 30.0]));

        {
            let fan = fan.clone();
            let fan_override = fan_override.clone();
            tokio::spawn(async move {
                run_fan_loop(
                    thermal,
                    fan,
                    FanGovernor::new(ThresholdTable::default()),
                    &fan_override,
                    Duration::from_secs(60),
                )
                .await
            });
        }

        // samples at t=0 (42°C), t=60 (30°C), t=120 (read fails)
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(*fan.0.lock().unwrap(), vec![0.5, 0.0, 0.0]);

        fan_override.toggle();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fan.0.lock().unwrap().last().copied(), Some(1.0));

        fan_override.toggle();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fan.0.lock().unwrap().last().copied(), Some(0.0));
    }
}
