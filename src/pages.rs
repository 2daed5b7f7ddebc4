//! Status page content
//!
//! A page is a short list of positioned text lines for the 128x32 panel.
//! [`SystemPages`] produces the three rotating pages: system, load/memory,
//! and disk usage.

use crate::metrics::{
    format_temperature, format_uptime, DiskUsage, SystemMetrics, TemperatureSource,
};
use log::debug;

/// Glyph height class of a text line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    /// 11px
    Small,
    /// 12px
    Medium,
    /// 14px
    Large,
}

impl TextSize {
    pub fn pixels(&self) -> u8 {
        match self {
            TextSize::Small => 11,
            TextSize::Medium => 12,
            TextSize::Large => 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub size: TextSize,
}

impl TextField {
    pub fn new(x: i32, y: i32, text: impl Into<String>, size: TextSize) -> Self {
        Self {
            x,
            y,
            text: text.into(),
            size,
        }
    }
}

/// One full frame of text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub fields: Vec<TextField>,
}

impl Page {
    pub fn new(fields: Vec<TextField>) -> Self {
        Self { fields }
    }

    /// Three small lines
    fn three_lines(lines: [String; 3]) -> Self {
        let [a, b, c] = lines;
        Self::new(vec![
            TextField::new(0, -2, a, TextSize::Small),
            TextField::new(0, 10, b, TextSize::Small),
            TextField::new(0, 21, c, TextSize::Small),
        ])
    }

    /// Two medium lines
    fn two_lines(first: String, second: String) -> Self {
        Self::new(vec![
            TextField::new(0, 2, first, TextSize::Medium),
            TextField::new(0, 18, second, TextSize::Medium),
        ])
    }

    /// Splash frame shown at startup
    pub fn welcome() -> Self {
        Self::new(vec![
            TextField::new(0, 0, "ROCKPi SATA HAT", TextSize::Large),
            TextField::new(32, 16, "Loading...", TextSize::Medium),
        ])
    }

    /// Frame shown while shutting down
    pub fn goodbye() -> Self {
        Self::new(vec![TextField::new(32, 8, "Good Bye ~", TextSize::Large)])
    }

    /// Text of every field, top to bottom
    pub fn texts(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.text.as_str()).collect()
    }
}

/// A fixed, indexable set of pages
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Build page `index`; `index < page_count()`
    fn page(&mut self, index: usize) -> Page;
}

/// Disk usage page, laid out by how many disks there are
pub fn disk_page(disks: &[DiskUsage]) -> Page {
    let entry = |d: &DiskUsage| format!("{} {}%", d.name, d.percent);
    let entries: Vec<String> = disks.iter().map(entry).collect();

    match entries.len() {
        0 => Page::new(vec![TextField::new(0, 2, "Disk: --", TextSize::Large)]),
        1 => Page::new(vec![TextField::new(0, 2, entries[0].clone(), TextSize::Large)]),
        2 | 3 => Page::two_lines(entries[0].clone(), entries[1..].join("  ")),
        _ => Page::three_lines([
            entries[0].clone(),
            entries[1..3].join("  "),
            entries[3..entries.len().min(5)].join("  "),
        ]),
    }
}

pub const SYSTEM_PAGE: usize = 0;
pub const LOAD_PAGE: usize = 1;
pub const DISK_PAGE: usize = 2;

/// The board's pages, built from live system metrics
pub struct SystemPages<T> {
    metrics: SystemMetrics,
    thermal: T,
    fahrenheit: bool,
}

impl<T: TemperatureSource> SystemPages<T> {
    pub fn new(metrics: SystemMetrics, thermal: T, fahrenheit: bool) -> Self {
        Self {
            metrics,
            thermal,
            fahrenheit,
        }
    }

    fn system_page(&mut self) -> Page {
        let temperature = match self.thermal.read_temperature() {
            Ok(celsius) => format_temperature(celsius, self.fahrenheit),
            Err(e) => {
                debug!("temperature for page unavailable: {}", e);
                "CPU Temp: --".to_string()
            }
        };
        let ip = self
            .metrics
            .primary_ip()
            .map_or_else(|| "IP --".to_string(), |ip| format!("IP {}", ip));

        Page::three_lines([
            format!("Uptime: {}", format_uptime(self.metrics.uptime())),
            temperature,
            ip,
        ])
    }

    fn load_page(&mut self) -> Page {
        let (used, total) = self.metrics.memory_mib();
        Page::two_lines(
            format!("CPU Load: {:.2}", self.metrics.load_average()),
            format!("Mem: {}/{}MB", used, total),
        )
    }
}

impl<T: TemperatureSource> PageSource for SystemPages<T> {
    fn page_count(&self) -> usize {
        DISK_PAGE + 1
    }

    fn page(&mut self, index: usize) -> Page {
        match index {
            SYSTEM_PAGE => self.system_page(),
            LOAD_PAGE => self.load_page(),
            _ => disk_page(&self.metrics.disk_usage()),
        }
    }
}
