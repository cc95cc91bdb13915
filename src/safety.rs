use crate::config::Config;

/// Protection state of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyState {
    #[default]
    Normal,
    Protected,
}

/// Edge reported by [`SafetyStateMachine::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NoChange,
    EnteredProtected,
    ExitedProtected,
}

/// Time of the most recent tick that saw flicker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CooldownTimer {
    last_flicker_us: Option<i64>,
}

impl CooldownTimer {
    fn refresh(&mut self, now_us: i64) {
        self.last_flicker_us = Some(now_us);
    }

    /// Microseconds since the last flicker, or `None` if none was recorded.
    pub fn quiet_for(&self, now_us: i64) -> Option<i64> {
        self.last_flicker_us.map(|t| now_us.saturating_sub(t))
    }

    pub fn last_flicker_us(&self) -> Option<i64> {
        self.last_flicker_us
    }
}

/// Normal/Protected state machine with cooldown hysteresis.
///
/// Flicker moves the machine to `Protected` immediately. It only returns to
/// `Normal` once more than `cooldown_us` has passed since the last tick that
/// saw flicker.
pub struct SafetyStateMachine {
    state: SafetyState,
    cooldown: CooldownTimer,
    cooldown_us: i64,
}

impl SafetyStateMachine {
    pub fn new(cooldown_us: i64) -> Self {
        assert!(cooldown_us >= 0, "cooldown_us must be non-negative");
        Self {
            state: SafetyState::Normal,
            cooldown: CooldownTimer::default(),
            cooldown_us,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cooldown_us())
    }

    pub fn update(&mut self, flicker_now: bool, now_us: i64) -> Transition {
        let (next, transition) = match (self.state, flicker_now) {
            (SafetyState::Normal, true) => {
                self.cooldown.refresh(now_us);
                (SafetyState::Protected, Transition::EnteredProtected)
            }
            (SafetyState::Protected, true) => {
                self.cooldown.refresh(now_us);
                (SafetyState::Protected, Transition::NoChange)
            }
            (SafetyState::Protected, false) => {
                let quiet = self.cooldown.quiet_for(now_us).unwrap_or(i64::MAX);
                if quiet > self.cooldown_us {
                    (SafetyState::Normal, Transition::ExitedProtected)
                } else {
                    (SafetyState::Protected, Transition::NoChange)
                }
            }
            (SafetyState::Normal, false) => (SafetyState::Normal, Transition::NoChange),
        };
        self.state = next;
        transition
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_protected(&self) -> bool {
        self.state == SafetyState::Protected
    }

    pub fn cooldown(&self) -> &CooldownTimer {
        &self.cooldown
    }

    pub fn cooldown_us(&self) -> i64 {
        self.cooldown_us
    }
}
