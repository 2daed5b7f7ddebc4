//! Edge sources feeding the gesture classifier
//!
//! The board's button is watched by `gpiomon`, run as a child process with a
//! fixed output format. Both the libgpiod 1.x and 2.x command lines are
//! supported. Each output line becomes an [`EdgeEvent`]; a reader thread
//! pushes them into a channel that [`ChannelEdgeSource`] drains.
//! Debouncing happens here, before the classifier ever sees an edge.

use crate::config::{ButtonConfig, GpiomonVersion};
use crate::errors::EdgeSourceError;
use crate::gesture::{EdgeEvent, EdgeKind, EdgeSource};
use log::{debug, info, warn};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// libgpiod 1.x format: event (`1` rising, `0` falling), seconds, nanoseconds
pub const GPIOMON_V1_FORMAT: &str = "--format=%e %s %n";
/// libgpiod 2.x format: event (`1` rising, `2` falling), `<sec>.<nsec>`
pub const GPIOMON_V2_FORMAT: &str = "%e %S";

/// Edge source backed by an in-process channel
pub struct ChannelEdgeSource {
    rx: Receiver<EdgeEvent>,
}

impl ChannelEdgeSource {
    /// Wrap the receiving end of an edge channel
    pub fn new(rx: Receiver<EdgeEvent>) -> Self {
        Self { rx }
    }

    /// A connected sender/source pair
    pub fn pair() -> (Sender<EdgeEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl EdgeSource for ChannelEdgeSource {
    fn wait_next(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<EdgeEvent>, EdgeSourceError> {
        match timeout {
            None => self
                .rx
                .recv()
                .map(Some)
                .map_err(|_| EdgeSourceError::Closed),
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(event) => Ok(Some(event)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(EdgeSourceError::Closed),
            },
        }
    }
}

/// Drops edges that follow the last accepted edge by less than `period`
pub struct Debounced<S> {
    inner: S,
    period: Duration,
    last_accepted: Option<Duration>,
}

impl<S: EdgeSource> Debounced<S> {
    /// Debounce `inner` with the given minimum spacing between edges
    pub fn new(inner: S, period: Duration) -> Self {
        Self {
            inner,
            period,
            last_accepted: None,
        }
    }
}

impl<S: EdgeSource> EdgeSource for Debounced<S> {
    fn wait_next(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<EdgeEvent>, EdgeSourceError> {
        let started = Instant::now();
        loop {
            let remaining = timeout.map(|t| t.saturating_sub(started.elapsed()));
            let Some(event) = self.inner.wait_next(remaining)? else {
                return Ok(None);
            };

            let bounced = self
                .last_accepted
                .is_some_and(|last| event.timestamp.saturating_sub(last) < self.period);
            if bounced {
                debug!("debounced {:?} at {:?}", event.kind, event.timestamp);
                continue;
            }

            self.last_accepted = Some(event.timestamp);
            return Ok(Some(event));
        }
    }
}

/// Parse one `gpiomon` line.
///
/// Accepts `<event> <sec> <nsec>` (libgpiod 1.x) and `<event> <sec>.<nsec>`
/// (libgpiod 2.x). The event is `1`/`rising`, or `0`/`2`/`falling`,
/// case-insensitive.
pub fn parse_edge_line(line: &str) -> Option<EdgeEvent> {
    let mut fields = line.split_whitespace();
    let kind = match fields.next()?.to_ascii_lowercase().as_str() {
        "1" | "rising" => EdgeKind::Rising,
        "0" | "2" | "falling" => EdgeKind::Falling,
        _ => return None,
    };
    let timestamp = match (fields.next()?, fields.next()) {
        (seconds, None) => parse_fractional_seconds(seconds)?,
        (secs, Some(nanos)) => {
            let nanos: u32 = nanos.parse().ok()?;
            if nanos >= 1_000_000_000 {
                return None;
            }
            Duration::new(secs.parse().ok()?, nanos)
        }
    };
    if fields.next().is_some() {
        return None;
    }
    Some(EdgeEvent { kind, timestamp })
}

/// `<sec>.<fraction>` with at most nine fraction digits
fn parse_fractional_seconds(text: &str) -> Option<Duration> {
    let (secs, fraction) = text.split_once('.').unwrap_or((text, ""));
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos = if fraction.is_empty() {
        0
    } else {
        fraction.parse::<u32>().ok()? * 10u32.pow(9 - fraction.len() as u32)
    };
    Some(Duration::new(secs.parse().ok()?, nanos))
}

/// Major libgpiod version from `gpiomon --version` output
pub fn version_from_banner(banner: &str) -> Option<GpiomonVersion> {
    banner
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('v'))
        .find_map(|version| match version.split('.').next()?.parse::<u32>().ok()? {
            1 => Some(GpiomonVersion::V1),
            major if major >= 2 => Some(GpiomonVersion::V2),
            _ => None,
        })
}

/// Resolve `auto` by asking the watcher; anything unrecognised is taken as 2.x
pub fn resolve_version(button: &ButtonConfig) -> GpiomonVersion {
    if button.version != GpiomonVersion::Auto {
        return button.version;
    }
    let detected = Command::new(&button.command)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .and_then(|out| version_from_banner(&String::from_utf8_lossy(&out.stdout)));
    match detected {
        Some(version) => {
            debug!("{} reports libgpiod {:?}", button.command, version);
            version
        }
        None => {
            warn!(
                "Could not detect the {} version; assuming libgpiod 2.x",
                button.command
            );
            GpiomonVersion::V2
        }
    }
}

/// Edges from a `gpiomon` child process.
///
/// The child is killed and reaped when the source is dropped or when a
/// [`WatcherStop`] handle is used, which also closes the edge stream.
pub struct GpiomonEdgeSource {
    child: Arc<Mutex<Child>>,
    edges: ChannelEdgeSource,
}

/// Stops a running edge watcher from another thread
#[derive(Clone)]
pub struct WatcherStop {
    child: Arc<Mutex<Child>>,
}

impl WatcherStop {
    /// Kill and reap the watcher; the edge stream then closes
    pub fn stop(&self) {
        stop_child(&self.child);
    }
}

fn stop_child(child: &Mutex<Child>) {
    let Ok(mut child) = child.lock() else {
        return;
    };
    if let Err(e) = child.kill() {
        debug!("edge watcher already gone: {}", e);
    }
    if let Err(e) = child.wait() {
        debug!("edge watcher could not be reaped: {}", e);
    }
}

impl GpiomonEdgeSource {
    /// The watcher command line for a button configuration.
    ///
    /// `Auto` is treated as 2.x; resolve it first with [`resolve_version`].
    pub fn command_line(button: &ButtonConfig, version: GpiomonVersion) -> Vec<String> {
        let mut argv = vec![button.command.clone()];
        match version {
            GpiomonVersion::V1 => {
                argv.push(GPIOMON_V1_FORMAT.to_string());
                argv.push(button.chip.clone());
            }
            GpiomonVersion::V2 | GpiomonVersion::Auto => {
                argv.extend(["-c".to_string(), button.chip.clone()]);
                argv.extend(["-F".to_string(), GPIOMON_V2_FORMAT.to_string()]);
                if button.debounce_ms > 0 {
                    argv.extend(["-p".to_string(), format!("{}ms", button.debounce_ms)]);
                }
            }
        }
        argv.push(button.line.to_string());
        argv
    }

    /// Start the watcher and its reader thread
    pub fn spawn(button: &ButtonConfig) -> Result<Self, EdgeSourceError> {
        let argv = Self::command_line(button, resolve_version(button));
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| EdgeSourceError::Spawn {
                command: argv.join(" "),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            EdgeSourceError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "edge watcher has no stdout",
            ))
        })?;

        let (tx, edges) = ChannelEdgeSource::pair();
        thread::Builder::new()
            .name("edge-reader".to_string())
            .spawn(move || forward_edges(BufReader::new(stdout), tx))?;

        info!(
            "Watching button on {} line {} (pid {})",
            button.chip,
            button.line,
            child.id()
        );
        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            edges,
        })
    }

    /// A handle that can stop the watcher from another thread
    pub fn stop_handle(&self) -> WatcherStop {
        WatcherStop {
            child: self.child.clone(),
        }
    }
}

/// Copy parsed edges from `reader` into `tx` until either side closes
fn forward_edges<R: BufRead>(reader: R, tx: Sender<EdgeEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Edge watcher read failed: {}", e);
                break;
            }
        };
        match parse_edge_line(&line) {
            Some(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!("Ignoring unrecognised edge watcher output: {:?}", line),
        }
    }
    debug!("edge reader finished");
}

impl EdgeSource for GpiomonEdgeSource {
    fn wait_next(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<EdgeEvent>, EdgeSourceError> {
        self.edges.wait_next(timeout)
    }
}

impl Drop for GpiomonEdgeSource {
    fn drop(&mut self) {
        stop_child(&self.child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::tests::ms;

    #[test]
    fn parses_numeric_and_named_events() {
        assert_eq!(
            parse_edge_line("1 12 500000000"),
            Some(EdgeEvent::rising(Duration::new(12, 500_000_000)))
        );
        assert_eq!(
            parse_edge_line("FALLING 3 7"),
            Some(EdgeEvent::falling(Duration::new(3, 7)))
        );
    }

    #[test]
    fn parses_libgpiod2_lines() {
        assert_eq!(
            parse_edge_line("2 1234.500000000"),
            Some(EdgeEvent::falling(Duration::new(1234, 500_000_000)))
        );
        assert_eq!(
            parse_edge_line("1 1234.000000007"),
            Some(EdgeEvent::rising(Duration::new(1234, 7)))
        );
        assert_eq!(
            parse_edge_line("2 5.25"),
            Some(EdgeEvent::falling(Duration::new(5, 250_000_000)))
        );
        assert_eq!(parse_edge_line("1 42"), Some(EdgeEvent::rising(Duration::new(42, 0))));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_edge_line(""), None);
        assert_eq!(parse_edge_line("3 1 0"), None);
        assert_eq!(parse_edge_line("1 abc 0"), None);
        assert_eq!(parse_edge_line("1 1 1000000000"), None);
        assert_eq!(parse_edge_line("1 1 0 extra"), None);
        assert_eq!(parse_edge_line("2 1.0000000001"), None);
        assert_eq!(parse_edge_line("2 1.-5"), None);
        assert_eq!(parse_edge_line("2"), None);
    }

    #[test]
    fn version_banner_detection() {
        assert_eq!(
            version_from_banner("gpiomon (libgpiod) v1.6.3\nCopyright (C) 2017-2018 Bartosz Golaszewski"),
            Some(GpiomonVersion::V1)
        );
        assert_eq!(
            version_from_banner("gpiomon (libgpiod) v2.1.1"),
            Some(GpiomonVersion::V2)
        );
        assert_eq!(version_from_banner("gpiomon: unrecognized option"), None);
    }

    #[test]
    fn explicit_version_skips_detection() {
        let button = ButtonConfig {
            command: "/nonexistent/penta-edge-watcher".to_string(),
            version: GpiomonVersion::V1,
            ..ButtonConfig::default()
        };
        assert_eq!(resolve_version(&button), GpiomonVersion::V1);
    }

    #[test]
    fn undetectable_version_assumes_libgpiod2() {
        let button = ButtonConfig {
            command: "/nonexistent/penta-edge-watcher".to_string(),
            ..ButtonConfig::default()
        };
        assert_eq!(resolve_version(&button), GpiomonVersion::V2);
    }

    #[test]
    fn channel_source_times_out_then_closes() {
        let (tx, mut source) = ChannelEdgeSource::pair();
        assert!(matches!(source.wait_next(Some(ms(5))), Ok(None)));

        tx.send(EdgeEvent::falling(ms(1))).unwrap();
        assert_eq!(
            source.wait_next(None).unwrap(),
            Some(EdgeEvent::falling(ms(1)))
        );

        drop(tx);
        assert!(matches!(
            source.wait_next(Some(ms(5))),
            Err(EdgeSourceError::Closed)
        ));
        assert!(matches!(source.wait_next(None), Err(EdgeSourceError::Closed)));
    }

    #[test]
    fn debounce_drops_bounces_within_period() {
        let (tx, source) = ChannelEdgeSource::pair();
        let mut source = Debounced::new(source, ms(10));
        for event in [
            EdgeEvent::falling(ms(100)),
            EdgeEvent::rising(ms(103)),
            EdgeEvent::falling(ms(107)),
            EdgeEvent::rising(ms(250)),
            EdgeEvent::falling(ms(258)),
        ] {
            tx.send(event).unwrap();
        }
        drop(tx);

        let mut accepted = Vec::new();
        while let Ok(Some(event)) = source.wait_next(None) {
            accepted.push(event);
        }
        assert_eq!(
            accepted,
            vec![EdgeEvent::falling(ms(100)), EdgeEvent::rising(ms(250))]
        );
    }

    #[test]
    fn debounce_passes_timeouts_through() {
        let (_tx, source) = ChannelEdgeSource::pair();
        let mut source = Debounced::new(source, ms(10));
        assert!(matches!(source.wait_next(Some(ms(5))), Ok(None)));
    }

    #[test]
    fn reader_forwards_parsed_edges_in_order() {
        let input = "0 1 0\nnoise\n\n1 1 200000000\n";
        let (tx, mut source) = ChannelEdgeSource::pair();
        forward_edges(std::io::Cursor::new(input), tx);

        assert_eq!(
            source.wait_next(None).unwrap(),
            Some(EdgeEvent::falling(Duration::new(1, 0)))
        );
        assert_eq!(
            source.wait_next(None).unwrap(),
            Some(EdgeEvent::rising(Duration::new(1, 200_000_000)))
        );
        assert!(source.wait_next(None).is_err());
    }

    #[test]
    fn command_line_uses_button_settings() {
        let button = ButtonConfig {
            chip: "gpiochip4".to_string(),
            line: 23,
            ..ButtonConfig::default()
        };
        assert_eq!(
            GpiomonEdgeSource::command_line(&button, GpiomonVersion::V1),
            vec!["gpiomon", "--format=%e %s %n", "gpiochip4", "23"]
        );
        assert_eq!(
            GpiomonEdgeSource::command_line(&button, GpiomonVersion::V2),
            vec!["gpiomon", "-c", "gpiochip4", "-F", "%e %S", "-p", "10ms", "23"]
        );

        let button = ButtonConfig {
            debounce_ms: 0,
            ..button
        };
        assert_eq!(
            GpiomonEdgeSource::command_line(&button, GpiomonVersion::V2),
            vec!["gpiomon", "-c", "gpiochip4", "-F", "%e %S", "23"]
        );
    }

    #[test]
    fn libgpiod2_output_reaches_the_source() {
        let input = "2 10.000000000\n1 10.120000000\n";
        let (tx, mut source) = ChannelEdgeSource::pair();
        forward_edges(std::io::Cursor::new(input), tx);

        assert_eq!(
            source.wait_next(None).unwrap(),
            Some(EdgeEvent::falling(Duration::new(10, 0)))
        );
        assert_eq!(
            source.wait_next(None).unwrap(),
            Some(EdgeEvent::rising(Duration::new(10, 120_000_000)))
        );
    }

    #[test]
    fn watcher_exit_closes_the_stream() {
        let button = ButtonConfig {
            command: "true".to_string(),
            ..ButtonConfig::default()
        };
        let mut source = GpiomonEdgeSource::spawn(&button).unwrap();
        assert!(matches!(source.wait_next(None), Err(EdgeSourceError::Closed)));
        source.stop_handle().stop();
    }

    #[test]
    fn spawn_failure_is_reported() {
        let button = ButtonConfig {
            command: "/nonexistent/penta-edge-watcher".to_string(),
            ..ButtonConfig::default()
        };
        assert!(matches!(
            GpiomonEdgeSource::spawn(&button),
            Err(EdgeSourceError::Spawn { .. })
        ));
    }
}
