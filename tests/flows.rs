//! End-to-end button flows: edges in, shared daemon state out

use penta_monitor::{
    config::KeyBindings,
    daemon::forward_gestures,
    edge::{ChannelEdgeSource, Debounced},
    pages::{PageSource, TextField, TextSize},
    Action, Dispatcher, EdgeEvent, FanOverride, Gesture, GestureClassifier, GestureTiming, Page,
    PageScheduler, SlideSignal,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

struct CountedPages;

impl PageSource for CountedPages {
    fn page_count(&self) -> usize {
        3
    }

    fn page(&mut self, index: usize) -> Page {
        Page::new(vec![TextField::new(0, 0, index.to_string(), TextSize::Small)])
    }
}

fn shared_state(bindings: KeyBindings) -> (Dispatcher, Arc<SlideSignal>, Arc<FanOverride>) {
    let slide = Arc::new(SlideSignal::new());
    let fan_override = Arc::new(FanOverride::new(false));
    let dispatcher = Dispatcher::new(bindings, slide.clone(), fan_override.clone());
    (dispatcher, slide, fan_override)
}

#[tokio::test]
async fn double_click_toggles_the_fan_override() {
    let (dispatcher, slide, fan_override) = shared_state(KeyBindings::default());
    let (edges, source) = ChannelEdgeSource::pair();

    // a contact bounce at 102ms is dropped before classification
    for event in [
        EdgeEvent::falling(ms(0)),
        EdgeEvent::rising(ms(100)),
        EdgeEvent::falling(ms(102)),
        EdgeEvent::falling(ms(300)),
        EdgeEvent::rising(ms(600)),
    ] {
        edges.send(event).unwrap();
    }
    drop(edges);

    let classifier = GestureClassifier::new(Debounced::new(source, ms(10)), GestureTiming::default());
    let (tx, rx) = unbounded_channel();
    let worker = thread::spawn(move || forward_gestures(classifier, tx));

    dispatcher.run(rx).await;
    worker.join().unwrap();

    assert!(fan_override.is_enabled());
    assert!(!slide.is_set());
}

#[tokio::test]
async fn long_press_release_is_not_a_click() {
    let bindings = KeyBindings {
        click: Action::Switch,
        twice: Action::None,
        press: Action::Slider,
    };
    let (dispatcher, slide, fan_override) = shared_state(bindings);
    let (edges, source) = ChannelEdgeSource::pair();

    // the whole hold is already in the queue, so the release at 2500ms is
    // seen as arriving after the 1800ms deadline
    edges.send(EdgeEvent::falling(ms(0))).unwrap();
    edges.send(EdgeEvent::rising(ms(2500))).unwrap();
    drop(edges);

    let classifier = GestureClassifier::new(source, GestureTiming::default());
    let (tx, rx) = unbounded_channel();
    let worker = thread::spawn(move || forward_gestures(classifier, tx));

    dispatcher.run(rx).await;
    worker.join().unwrap();

    assert!(slide.is_set());
    assert!(!fan_override.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn click_advances_a_manual_display() {
    let (dispatcher, slide, _) = shared_state(KeyBindings::default());
    let shown = Arc::new(Mutex::new(Vec::new()));

    let sink = {
        let shown = shown.clone();
        move |page: &Page| shown.lock().unwrap().push(page.texts()[0].to_string())
    };
    let mut scheduler = PageScheduler::new(CountedPages, sink, false, Duration::from_secs(10));
    tokio::spawn(async move { scheduler.run(&slide).await });

    let (tx, rx) = unbounded_channel();
    tokio::spawn(dispatcher.run(rx));

    tokio::time::sleep(Duration::from_secs(2)).await;
    tx.send(Gesture::Click).unwrap();
    tx.send(Gesture::Click).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    let first_wave = shown.lock().unwrap().clone();
    assert_eq!(first_wave.first().map(String::as_str), Some("0"));
    assert!(first_wave.len() >= 2);

    // no more signals: the manual display refreshes in place
    let before = shown.lock().unwrap().last().cloned();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(shown.lock().unwrap().last().cloned(), before);
}
