//! System metrics shown on the status pages and fed to the fan loop

use crate::errors::{HatError, Result};
use log::{debug, info};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};

/// SoC thermal zone, reported in millidegrees Celsius
pub const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// How long disk usage figures are reused before being read again
pub const DISK_CACHE_TTL: Duration = Duration::from_secs(30);

/// Anything that can report a temperature in °C
pub trait TemperatureSource {
    fn read_temperature(&self) -> Result<f32>;
}

/// Temperature read from a sysfs thermal zone
#[derive(Debug, Clone)]
pub struct SysfsThermal {
    path: PathBuf,
}

impl SysfsThermal {
    /// Read from a specific thermal zone file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for SysfsThermal {
    fn default() -> Self {
        Self::new(THERMAL_ZONE_PATH)
    }
}

impl TemperatureSource for SysfsThermal {
    fn read_temperature(&self) -> Result<f32> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            HatError::metric("temperature", format!("{}: {}", self.path.display(), e))
        })?;

        let millidegrees: i64 = content.trim().parse().map_err(|_| {
            HatError::metric(
                "temperature",
                format!("expected millidegrees, got {:?}", content.trim()),
            )
        })?;
        let celsius = millidegrees as f32 / 1000.0;

        if !(-50.0..=200.0).contains(&celsius) {
            return Err(HatError::metric(
                "temperature",
                format!("reading out of range: {:.1}°C", celsius),
            ));
        }
        Ok(celsius)
    }
}

/// Usage of one mounted disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    /// `root` for `/`, otherwise the block device name (`sda`, `nvme0n1`)
    pub name: String,
    pub percent: u8,
}

impl DiskUsage {
    /// Usage percentage from total and available bytes
    pub fn from_space(name: impl Into<String>, total: u64, available: u64) -> Self {
        let percent = if total == 0 {
            0
        } else {
            let used = total.saturating_sub(available) as u128;
            // round up the way df does
            ((used * 100 + total as u128 - 1) / total as u128).min(100) as u8
        };
        Self {
            name: name.into(),
            percent,
        }
    }
}

/// Load, memory, network and disk statistics via `sysinfo`
pub struct SystemMetrics {
    system: System,
    extra_disks: Vec<String>,
    disk_cache: Option<(Instant, Vec<DiskUsage>)>,
}

impl SystemMetrics {
    /// Create a collector that also lists `extra_disks`
    pub fn new(extra_disks: Vec<String>) -> Self {
        info!("System metrics initialised (extra disks: {:?})", extra_disks);
        Self {
            system: System::new(),
            extra_disks,
            disk_cache: None,
        }
    }

    /// Time since boot
    pub fn uptime(&self) -> Duration {
        Duration::from_secs(System::uptime())
    }

    /// One-minute load average
    pub fn load_average(&self) -> f64 {
        System::load_average().one
    }

    /// Used and total memory in MiB
    pub fn memory_mib(&mut self) -> (u64, u64) {
        self.system.refresh_memory();
        (
            self.system.used_memory() / (1024 * 1024),
            self.system.total_memory() / (1024 * 1024),
        )
    }

    /// First IPv4 address that is not loopback
    pub fn primary_ip(&self) -> Option<IpAddr> {
        let networks = Networks::new_with_refreshed_list();
        let mut interfaces: Vec<_> = networks.list().iter().collect();
        interfaces.sort_by(|a, b| a.0.cmp(b.0));
        interfaces.into_iter().find_map(|(_, data)| {
            data.ip_networks()
                .iter()
                .map(|net| net.addr)
                .find(|addr| addr.is_ipv4() && !addr.is_loopback())
        })
    }

    /// Root filesystem first, then `sd*` and configured extra disks by name.
    /// Cached for [`DISK_CACHE_TTL`].
    pub fn disk_usage(&mut self) -> Vec<DiskUsage> {
        if let Some((at, usage)) = &self.disk_cache {
            if at.elapsed() < DISK_CACHE_TTL {
                return usage.clone();
            }
        }

        let disks = Disks::new_with_refreshed_list();
        let mut root = None;
        let mut others = Vec::new();
        for disk in disks.list() {
            let usage = |name: &str| {
                DiskUsage::from_space(name, disk.total_space(), disk.available_space())
            };
            if disk.mount_point() == Path::new("/") {
                root = Some(usage("root"));
                continue;
            }
            let device = disk.name().to_string_lossy();
            let device = device.trim_start_matches("/dev/");
            if is_listed_disk(device, &self.extra_disks)
                && !others.iter().any(|d: &DiskUsage| d.name == device)
            {
                others.push(usage(device));
            }
        }
        others.sort_by(|a, b| a.name.cmp(&b.name));

        let usage: Vec<DiskUsage> = root.into_iter().chain(others).collect();
        debug!("disk usage: {:?}", usage);
        self.disk_cache = Some((Instant::now(), usage.clone()));
        usage
    }
}

/// SATA disks (`sd*`) are always shown; anything else only when configured
fn is_listed_disk(device: &str, extra: &[String]) -> bool {
    device.starts_with("sd") || extra.iter().any(|e| e == device)
}

/// `uptime`-style duration: `15 min`, `4:05`, `3 days`
pub fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    let (days, hours, minutes) = (minutes / 1440, (minutes / 60) % 24, minutes % 60);
    match (days, hours) {
        (1, _) => "1 day".to_string(),
        (d, _) if d > 1 => format!("{} days", d),
        (_, 0) => format!("{} min", minutes),
        (_, h) => format!("{}:{:02}", h, minutes),
    }
}

/// CPU temperature line for the system page
pub fn format_temperature(celsius: f32, fahrenheit: bool) -> String {
    if fahrenheit {
        format!("CPU Temp: {:.0}°F", celsius * 1.8 + 32.0)
    } else {
        format!("CPU Temp: {:.1}°C", celsius)
    }
}
