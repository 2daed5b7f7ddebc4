//! Gesture dispatch table
//!
//! Turns each classified gesture into its configured action. Dispatching only
//! flips shared state (the slide signal or the fan override) and returns, so
//! the button flow never waits on the page scheduler or the fan loop.

use crate::config::KeyBindings;
use crate::fan::FanOverride;
use crate::gesture::Gesture;
use crate::slider::SlideSignal;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// What a gesture does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Advance the display to the next page
    Slider,
    /// Toggle the fan override
    Switch,
    None,
}

impl Action {
    /// Name used in the configuration file
    pub fn name(&self) -> &'static str {
        match self {
            Action::Slider => "slider",
            Action::Switch => "switch",
            Action::None => "none",
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "slider" => Action::Slider,
            "switch" => Action::Switch,
            _ => Action::None,
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::from(name.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.name().to_string()
    }
}

impl KeyBindings {
    /// Action bound to `gesture`
    pub fn action_for(&self, gesture: Gesture) -> Action {
        match gesture {
            Gesture::Click => self.click,
            Gesture::DoubleClick => self.twice,
            Gesture::LongPress => self.press,
        }
    }
}

/// Applies gesture bindings to the shared daemon state
#[derive(Clone)]
pub struct Dispatcher {
    bindings: KeyBindings,
    slide: Arc<SlideSignal>,
    fan_override: Arc<FanOverride>,
}

impl Dispatcher {
    pub fn new(
        bindings: KeyBindings,
        slide: Arc<SlideSignal>,
        fan_override: Arc<FanOverride>,
    ) -> Self {
        Self {
            bindings,
            slide,
            fan_override,
        }
    }

    /// Perform the action bound to `gesture` and report which one it was
    pub fn dispatch(&self, gesture: Gesture) -> Action {
        let action = self.bindings.action_for(gesture);
        match action {
            Action::Slider => self.slide.set(),
            Action::Switch => {
                let enabled = self.fan_override.toggle();
                info!(
                    "Fan override {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            Action::None => {}
        }
        debug!("{:?} -> {}", gesture, action.name());
        action
    }

    /// Dispatch gestures in arrival order until the sender goes away
    pub async fn run(self, mut gestures: UnboundedReceiver<Gesture>) {
        while let Some(gesture) = gestures.recv().await {
            self.dispatch(gesture);
        }
        info!("Gesture channel closed, dispatcher stopping");
    }
}
