//! Daemon wiring: button, fan and display flows

use crate::{
    config::Config,
    dispatch::Dispatcher,
    display::{LogSink, RenderSink},
    edge::{Debounced, GpiomonEdgeSource, WatcherStop},
    errors::Result,
    fan::{FanGovernor, FanOverride},
    fan_control::{run_fan_loop, DryRunFan, FanController, FanOutput},
    gesture::{EdgeSource, Gesture, GestureClassifier, GestureTiming},
    metrics::{SysfsThermal, SystemMetrics},
    pages::{Page, PageSource, SystemPages},
    slider::{PageScheduler, SlideSignal},
};
use log::{error, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

/// How long the goodbye frame stays up before the panel is cleared
const GOODBYE_HOLD: Duration = Duration::from_secs(2);

/// Main daemon structure
pub struct HatDaemon {
    config: Config,
    fan_override: Arc<FanOverride>,
    slide: Arc<SlideSignal>,
}

impl HatDaemon {
    /// Create a new daemon instance
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fan_override: Arc::new(FanOverride::new(false)),
            slide: Arc::new(SlideSignal::new()),
        }
    }

    /// Shared fan override flag
    pub fn fan_override(&self) -> Arc<FanOverride> {
        self.fan_override.clone()
    }

    /// Shared forced-advance signal
    pub fn slide_signal(&self) -> Arc<SlideSignal> {
        self.slide.clone()
    }

    /// Classifier timings from the `time` section
    pub fn gesture_timing(&self) -> GestureTiming {
        GestureTiming {
            long_press: self.config.time.long_press(),
            double_click: self.config.time.double_click_window(),
        }
    }

    /// Dispatcher bound to this daemon's shared state
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.config.key.clone(),
            self.slide.clone(),
            self.fan_override.clone(),
        )
    }

    /// Start the edge watcher, the classifier thread and the dispatcher task
    fn spawn_button_flow(&self) -> Result<(WatcherStop, JoinHandle<()>)> {
        let watcher = GpiomonEdgeSource::spawn(&self.config.button)?;
        let stop = watcher.stop_handle();
        let source = Debounced::new(watcher, self.config.button.debounce());
        let classifier = GestureClassifier::new(source, self.gesture_timing());

        let (tx, rx) = unbounded_channel();
        thread::Builder::new()
            .name("gesture-classifier".to_string())
            .spawn(move || forward_gestures(classifier, tx))?;

        Ok((stop, tokio::spawn(self.dispatcher().run(rx))))
    }

    /// Start the fan loop on the configured PWM output
    fn spawn_fan_flow(&self) -> JoinHandle<()> {
        let output: Box<dyn FanOutput + Send> = match FanController::from_config(&self.config.pwm)
        {
            Ok(controller) => Box::new(controller),
            Err(e) => {
                warn!("No usable PWM output ({}); fan duty will only be logged", e);
                Box::new(DryRunFan::default())
            }
        };
        let governor = FanGovernor::new(self.config.threshold_table());
        let fan_override = self.fan_override.clone();
        let period = self.config.fan.sample_interval();

        tokio::spawn(async move {
            run_fan_loop(SysfsThermal::default(), output, governor, &fan_override, period).await
        })
    }

    /// Run the daemon until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        info!("Starting monitor daemon");

        let pages = SystemPages::new(
            SystemMetrics::new(self.config.disk.extra.clone()),
            SysfsThermal::default(),
            self.config.display.fahrenheit,
        );
        let mut scheduler = PageScheduler::new(
            pages,
            LogSink::new(),
            self.config.slider.auto,
            self.config.slider.interval(),
        );
        scheduler.show(&Page::welcome());

        let button = match self.spawn_button_flow() {
            Ok(flow) => Some(flow),
            Err(e) => {
                error!("Button disabled: {}", e);
                None
            }
        };
        let fan = self.spawn_fan_flow();

        let outcome = tokio::select! {
            _ = scheduler.run(&self.slide) => Ok(()),
            signal = shutdown_signal() => signal,
        };
        info!("Shutting down");

        if let Some((stop, dispatcher)) = button {
            stop.stop();
            if let Err(e) = dispatcher.await {
                warn!("Dispatcher task failed: {}", e);
            }
        }
        fan.abort();

        scheduler.show(&Page::goodbye());
        tokio::time::sleep(GOODBYE_HOLD).await;
        scheduler.show(&Page::default());

        outcome
    }
}

/// Classify edges on the current thread and send each gesture on `tx`.
///
/// Returns when the edge source fails or the receiver is dropped.
pub fn forward_gestures<S: EdgeSource>(
    classifier: GestureClassifier<S>,
    tx: UnboundedSender<Gesture>,
) {
    for gesture in classifier {
        match gesture {
            Ok(gesture) => {
                if tx.send(gesture).is_err() {
                    break;
                }
            }
            Err(e) => error!("Button watcher stopped: {}", e),
        }
    }
    info!("Gesture classifier finished");
}

/// Render every page once to `sink`
pub fn render_all_pages<R: RenderSink>(config: &Config, sink: R) {
    let pages = SystemPages::new(
        SystemMetrics::new(config.disk.extra.clone()),
        SysfsThermal::default(),
        config.display.fahrenheit,
    );
    let count = pages.page_count();
    let mut scheduler = PageScheduler::new(pages, sink, true, config.slider.interval());
    for _ in 0..count {
        scheduler.advance();
    }
}

async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
