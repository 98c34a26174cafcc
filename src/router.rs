//! Mode-switch detection and line dispatch.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::ValidationError;
use crate::modes::{
    Action, CalcController, DisplayController, Event, GenerateController, InputController,
    ModeController, ModeKey, Outbox,
};

const SWITCH_PREFIX: &str = "mode-";

/// Owns one controller per mode and forwards lines to the active one.
#[derive(Debug)]
pub struct ModeRouter {
    input: InputController,
    generate: GenerateController,
    display: DisplayController,
    calc: CalcController,
    current: ModeKey,
    accept_bare_keys: bool,
}

impl ModeRouter {
    pub fn new(config: &Config) -> Self {
        Self {
            input: InputController::new(config.limits),
            generate: GenerateController::new(config.limits),
            display: DisplayController::new(),
            calc: CalcController::new(config.protocol.calc_flow),
            current: ModeKey::Idle,
            accept_bare_keys: config.protocol.accept_bare_mode_keys,
        }
    }

    pub fn current_mode(&self) -> ModeKey {
        self.current
    }

    /// Parses a mode-switch line: `mode-<key>`, or a bare `<key>` when
    /// `accept_bare_keys` is set.
    pub fn switch_target(line: &str, accept_bare_keys: bool) -> Option<ModeKey> {
        let line = line.trim();
        match line.strip_prefix(SWITCH_PREFIX) {
            Some(key) => ModeKey::from_key(key),
            None if accept_bare_keys => ModeKey::from_key(line),
            None => None,
        }
    }

    /// Handles one inbound line: either a mode switch or input for the active
    /// controller.
    pub fn route(&mut self, line: &str, out: &mut Outbox) {
        if let Some(key) = Self::switch_target(line, self.accept_bare_keys) {
            self.switch_to(key, out);
            return;
        }
        match self.active_mut() {
            Some(ctl) => ctl.handle_line(line, out),
            None => debug!(line, "idle, ignoring"),
        }
    }

    /// Makes `key` the active mode. The target controller is reset and then
    /// activated even if it was already active.
    pub fn switch_to(&mut self, key: ModeKey, out: &mut Outbox) {
        let previous = self.current;
        self.current = key;
        if let Some(ctl) = self.active_mut() {
            ctl.reset();
            ctl.activate(out);
        }
        info!(from = %previous, to = %key, "mode switched");
        out.emit(Event::ModeChanged(key));
    }

    /// Applies an operator action to the active controller. `Reset` is
    /// handled here for every mode.
    pub fn apply(&mut self, action: &Action, out: &mut Outbox) -> Result<(), ValidationError> {
        if let Action::Reset = action {
            self.reset_active();
            return Ok(());
        }
        let ctl = self.active_mut().ok_or(ValidationError::NoActiveMode)?;
        ctl.apply(action, out)
    }

    /// Returns the active controller to its entry phase. No-op while idle.
    pub fn reset_active(&mut self) {
        let mode = self.current;
        if let Some(ctl) = self.active_mut() {
            debug!(%mode, "resetting active mode");
            ctl.reset();
        }
    }

    pub fn active(&self) -> Option<&dyn ModeController> {
        match self.current {
            ModeKey::Idle => None,
            ModeKey::Input => Some(&self.input),
            ModeKey::Generate => Some(&self.generate),
            ModeKey::Display => Some(&self.display),
            ModeKey::Calc => Some(&self.calc),
        }
    }

    fn active_mut(&mut self) -> Option<&mut dyn ModeController> {
        match self.current {
            ModeKey::Idle => None,
            ModeKey::Input => Some(&mut self.input),
            ModeKey::Generate => Some(&mut self.generate),
            ModeKey::Display => Some(&mut self.display),
            ModeKey::Calc => Some(&mut self.calc),
        }
    }

    pub fn calc(&self) -> &CalcController {
        &self.calc
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    pub fn generate(&self) -> &GenerateController {
        &self.generate
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn accepts_bare_keys(&self) -> bool {
        self.accept_bare_keys
    }
}

impl Default for ModeRouter {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
