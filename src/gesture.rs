//! Button gesture classification
//!
//! The button is active low: a falling edge is a press and a rising edge is
//! a release. [`GestureClassifier`] pulls edges one at a time from an
//! [`EdgeSource`] and turns them into clicks, double clicks and long presses.
//!
//! Both timers are deadlines measured from the edge that armed them. The
//! long-press timer starts at the press; the double-click window starts at the
//! first release, so the second release must land inside that window no
//! matter when the second press happened.

use crate::errors::{EdgeSourceError, HatError, Result};
use log::{debug, trace};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// A line transition, timestamped on a monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub kind: EdgeKind,
    /// Time since an arbitrary fixed epoch of the source's monotonic clock
    pub timestamp: Duration,
}

impl EdgeEvent {
    /// Release edge at `timestamp`
    pub fn rising(timestamp: Duration) -> Self {
        Self {
            kind: EdgeKind::Rising,
            timestamp,
        }
    }

    /// Press edge at `timestamp`
    pub fn falling(timestamp: Duration) -> Self {
        Self {
            kind: EdgeKind::Falling,
            timestamp,
        }
    }
}

/// Producer of button edges
pub trait EdgeSource {
    /// Block until the next edge or until `timeout` elapses.
    ///
    /// `Ok(None)` means the timeout elapsed. `None` as the timeout blocks
    /// until an edge arrives. An error ends the stream.
    fn wait_next(
        &mut self,
        timeout: Option<Duration>,
    ) -> std::result::Result<Option<EdgeEvent>, EdgeSourceError>;
}

impl<S: EdgeSource + ?Sized> EdgeSource for Box<S> {
    fn wait_next(
        &mut self,
        timeout: Option<Duration>,
    ) -> std::result::Result<Option<EdgeEvent>, EdgeSourceError> {
        (**self).wait_next(timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    DoubleClick,
    LongPress,
}

impl Gesture {
    /// Key name used in the `key` configuration section
    pub fn key_name(&self) -> &'static str {
        match self {
            Gesture::Click => "click",
            Gesture::DoubleClick => "twice",
            Gesture::LongPress => "press",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Pressed with no click counted yet; long press fires at `deadline`
    ArmedAfterPress { deadline: Duration },
    /// One click counted; a second release before `deadline` is a double click
    AwaitingSecondClick { deadline: Duration },
}

impl State {
    fn deadline(&self) -> Option<Duration> {
        match *self {
            State::Idle => None,
            State::ArmedAfterPress { deadline } | State::AwaitingSecondClick { deadline } => {
                Some(deadline)
            }
        }
    }
}

/// Gesture timings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTiming {
    pub long_press: Duration,
    pub double_click: Duration,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            long_press: Duration::from_millis(1800),
            double_click: Duration::from_millis(700),
        }
    }
}

/// State machine turning edges into gestures.
///
/// Iterating yields `Ok(gesture)` until the source fails, then the error
/// once, then nothing.
pub struct GestureClassifier<S> {
    source: S,
    timing: GestureTiming,
    state: State,
    ignore_release: bool,
    /// Timestamp of the last edge consumed
    now: Duration,
    /// Edge that arrived after the active deadline; replayed once the
    /// expired timer has been reported
    pending: Option<EdgeEvent>,
    finished: bool,
}

impl<S: EdgeSource> GestureClassifier<S> {
    /// Create an idle classifier reading from `source`
    pub fn new(source: S, timing: GestureTiming) -> Self {
        Self {
            source,
            timing,
            state: State::Idle,
            ignore_release: false,
            now: Duration::ZERO,
            pending: None,
            finished: false,
        }
    }

    /// The underlying edge source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Block until the next complete gesture
    pub fn next_gesture(&mut self) -> Result<Gesture> {
        loop {
            let event = match self.pending.take() {
                Some(event) => Some(event),
                None => {
                    let timeout = self
                        .state
                        .deadline()
                        .map(|deadline| deadline.saturating_sub(self.now));
                    trace!("waiting for edge, timeout {:?}", timeout);
                    self.source.wait_next(timeout).map_err(HatError::from)?
                }
            };

            let gesture = match event {
                None => self.on_timeout(),
                Some(event) => match self.state.deadline() {
                    Some(deadline) if event.timestamp >= deadline => {
                        self.pending = Some(event);
                        self.on_timeout()
                    }
                    _ => self.on_edge(event),
                },
            };

            if let Some(gesture) = gesture {
                debug!("gesture: {:?}", gesture);
                return Ok(gesture);
            }
        }
    }

    fn on_timeout(&mut self) -> Option<Gesture> {
        if let Some(deadline) = self.state.deadline() {
            self.now = self.now.max(deadline);
        }
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::ArmedAfterPress { .. } => {
                // the button is still held; its release is not a click
                self.ignore_release = true;
                Some(Gesture::LongPress)
            }
            State::AwaitingSecondClick { .. } => Some(Gesture::Click),
        }
    }

    fn on_edge(&mut self, event: EdgeEvent) -> Option<Gesture> {
        self.now = self.now.max(event.timestamp);
        match event.kind {
            EdgeKind::Falling => {
                if let State::Idle | State::ArmedAfterPress { .. } = self.state {
                    self.state = State::ArmedAfterPress {
                        deadline: event.timestamp + self.timing.long_press,
                    };
                }
                None
            }
            EdgeKind::Rising => {
                if self.ignore_release {
                    self.ignore_release = false;
                    trace!("release after long press ignored");
                    self.state = State::Idle;
                    return None;
                }
                match self.state {
                    State::AwaitingSecondClick { .. } => {
                        self.state = State::Idle;
                        Some(Gesture::DoubleClick)
                    }
                    State::Idle | State::ArmedAfterPress { .. } => {
                        self.state = State::AwaitingSecondClick {
                            deadline: event.timestamp + self.timing.double_click,
                        };
                        None
                    }
                }
            }
        }
    }
}

impl<S: EdgeSource> Iterator for GestureClassifier<S> {
    type Item = Result<Gesture>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_gesture();
        if item.is_err() {
            self.finished = true;
        }
        Some(item)
    }
}
