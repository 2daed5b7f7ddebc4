//! Render sinks for finished pages

use crate::pages::Page;
use log::info;

/// Paints a page and flips it onto the panel
pub trait RenderSink {
    fn render(&mut self, page: &Page);
}

impl<F: FnMut(&Page)> RenderSink for F {
    fn render(&mut self, page: &Page) {
        self(page)
    }
}

/// Writes each frame to the log, one line per frame
#[derive(Debug, Default)]
pub struct LogSink {
    frames: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for LogSink {
    fn render(&mut self, page: &Page) {
        self.frames += 1;
        info!("frame {}: {}", self.frames, page.texts().join(" | "));
    }
}
