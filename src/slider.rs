//! Page scheduler
//!
//! Rotates through the pages on a timer and jumps ahead whenever the slide
//! signal is raised. The signal is level-triggered: however many times it is
//! set between two iterations, the scheduler advances once.

use crate::display::RenderSink;
use crate::pages::{Page, PageSource};
use log::{debug, trace};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Waitable "advance now" flag shared with the dispatcher
#[derive(Debug, Default)]
pub struct SlideSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl SlideSignal {
    /// Create a lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake the scheduler
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Lower the signal without waking anyone
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether an advance is pending
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the signal.
    ///
    /// Returns `true` and clears the signal if it was raised, `false` on
    /// timeout. A signal raised before the call returns immediately.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.notify.notified());
            // register before checking the flag so a concurrent set() is seen
            notified.as_mut().enable();
            if self.flag.swap(false, Ordering::AcqRel) {
                return true;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.flag.swap(false, Ordering::AcqRel);
            }
        }
    }
}

/// Owns the page index and drives the render sink
pub struct PageScheduler<P, R> {
    pages: P,
    sink: R,
    index: Option<usize>,
    auto: bool,
    interval: Duration,
}

impl<P: PageSource, R: RenderSink> PageScheduler<P, R> {
    /// Create a scheduler; nothing is rendered until the first step
    pub fn new(pages: P, sink: R, auto: bool, interval: Duration) -> Self {
        Self {
            pages,
            sink,
            index: None,
            auto,
            interval,
        }
    }

    /// Current page, `None` before the first advance
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Move to the next page and render it
    pub fn advance(&mut self) -> usize {
        let count = self.pages.page_count().max(1);
        let next = self.index.map_or(0, |i| (i + 1) % count);
        self.index = Some(next);
        self.draw(next);
        next
    }

    /// Render the current page again with fresh content
    pub fn refresh(&mut self) -> usize {
        match self.index {
            Some(index) => {
                self.draw(index);
                index
            }
            None => self.advance(),
        }
    }

    /// One scheduling step: advance when rotating automatically or when
    /// forced, otherwise refresh in place
    pub fn step(&mut self, forced: bool) -> usize {
        if self.auto || forced {
            self.advance()
        } else {
            self.refresh()
        }
    }

    /// Render a frame that is not one of the rotating pages
    pub fn show(&mut self, page: &Page) {
        self.sink.render(page);
    }

    fn draw(&mut self, index: usize) {
        let page = self.pages.page(index);
        trace!("render page {}: {:?}", index, page.texts());
        self.sink.render(&page);
    }

    /// Run forever. The first iteration always shows page 0.
    pub async fn run(&mut self, signal: &SlideSignal) {
        let mut forced = true;
        loop {
            let index = self.step(forced);
            debug!("page {} shown (forced: {})", index, forced);
            forced = signal.wait(self.interval).await;
        }
    }
}
