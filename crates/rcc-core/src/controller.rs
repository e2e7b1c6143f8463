//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Compressor, defrost and fault state machine."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rcc_common::{ControlConfig, ControllerTuning, WalkInDimensions};
use strum::{Display, EnumString, IntoStaticStr};
use tracing::info;

use crate::store::{format_float, IoSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Cooling,
    Defrost,
    Fault,
}

/// Why the controller entered Fault. Variants are listed in priority order
/// for ticks where several causes are present at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FaultReason {
    PowerLoss,
    PanicButton,
    SensorImplausible,
}

/// Snapshot published once per tick and served to `GET STATUS`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub compressor_on: bool,
    pub defrost_on: bool,
    pub seconds_in_state: u64,
    pub fault_reason: Option<FaultReason>,
    pub runtime_since_defrost_s: u64,
    /// Alarm output; follows the panic button in every state.
    pub panic_alarm_on: bool,
    pub walk_in: WalkInDimensions,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            state: ControllerState::Idle,
            compressor_on: false,
            defrost_on: false,
            seconds_in_state: 0,
            fault_reason: None,
            runtime_since_defrost_s: 0,
            panic_alarm_on: false,
            walk_in: WalkInDimensions::default(),
        }
    }
}

/// Renders the `key=value,...` body of a `STATUS` response.
impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fault: &str = match self.fault_reason {
            Some(reason) => reason.into(),
            None => "none",
        };
        write!(
            f,
            "state={},compressor_on={},defrost_on={},seconds_in_state={},fault_reason={},runtime_since_defrost_s={}",
            self.state,
            u8::from(self.compressor_on),
            u8::from(self.defrost_on),
            self.seconds_in_state,
            fault,
            self.runtime_since_defrost_s,
        )?;
        write!(
            f,
            ",panic_alarm_on={},length_ft={},width_ft={},height_ft={},volume_ft3={}",
            u8::from(self.panic_alarm_on),
            format_float(self.walk_in.length_ft),
            format_float(self.walk_in.width_ft),
            format_float(self.walk_in.height_ft),
            format_float(self.walk_in.volume_ft3()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ControllerState,
    pub to: ControllerState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub status: ControllerStatus,
    pub transition: Option<Transition>,
}

/// Walk-in cooler state machine.
///
/// Time only advances through [`RefrigerationController::tick`], so the
/// controller is fully deterministic under simulated ticks. Each tick first
/// charges `elapsed` to the timers of the state it started in, then
/// evaluates at most one transition.
#[derive(Debug, Clone)]
pub struct RefrigerationController {
    tuning: ControllerTuning,
    state: ControllerState,
    fault_reason: Option<FaultReason>,
    in_state: Duration,
    /// Compressor run time accumulated since the last completed defrost.
    runtime_since_defrost: Duration,
    /// Time since the compressor last switched off. Starts at zero, so the
    /// minimum off-time also applies after a restart.
    compressor_off_for: Duration,
    defrost_elapsed: Duration,
    panic_alarm: bool,
    walk_in: WalkInDimensions,
}

impl RefrigerationController {
    pub fn new(tuning: ControllerTuning) -> Self {
        Self {
            tuning,
            state: ControllerState::Idle,
            fault_reason: None,
            in_state: Duration::ZERO,
            runtime_since_defrost: Duration::ZERO,
            compressor_off_for: Duration::ZERO,
            defrost_elapsed: Duration::ZERO,
            panic_alarm: false,
            walk_in: WalkInDimensions::default(),
        }
    }

    /// Cold-room size reported in every status snapshot.
    pub fn with_walk_in(mut self, walk_in: WalkInDimensions) -> Self {
        self.walk_in = walk_in;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn compressor_on(&self) -> bool {
        self.state == ControllerState::Cooling
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            compressor_on: self.compressor_on(),
            defrost_on: self.state == ControllerState::Defrost,
            seconds_in_state: self.in_state.as_secs(),
            fault_reason: self.fault_reason,
            runtime_since_defrost_s: self.runtime_since_defrost.as_secs(),
            panic_alarm_on: self.panic_alarm,
            walk_in: self.walk_in,
        }
    }

    pub fn tick(
        &mut self,
        config: &ControlConfig,
        io: &IoSnapshot,
        elapsed: Duration,
    ) -> TickOutcome {
        self.advance_timers(elapsed);
        self.panic_alarm = io.panic_button_pressed;
        let from = self.state;
        if let Some(next) = self.next_state(config, io) {
            self.enter(next);
        }
        let transition = (self.state != from).then_some(Transition {
            from,
            to: self.state,
        });
        if let Some(transition) = transition {
            info!(
                from = %transition.from,
                to = %transition.to,
                reason = ?self.fault_reason,
                "controller transition"
            );
        }
        TickOutcome {
            status: self.status(),
            transition,
        }
    }

    /// Operator clear. Only meaningful in Fault; returns whether it applied.
    /// If the cause persists the next tick faults again.
    pub fn acknowledge_fault(&mut self) -> bool {
        if self.state != ControllerState::Fault {
            return false;
        }
        info!(reason = ?self.fault_reason, "fault acknowledged");
        self.enter(ControllerState::Idle);
        true
    }

    fn advance_timers(&mut self, elapsed: Duration) {
        self.in_state += elapsed;
        if self.compressor_on() {
            self.runtime_since_defrost += elapsed;
        } else {
            self.compressor_off_for += elapsed;
        }
        if self.state == ControllerState::Defrost {
            self.defrost_elapsed += elapsed;
        }
    }

    fn fault_cause(&self, io: &IoSnapshot) -> Option<FaultReason> {
        if !io.power_ok {
            Some(FaultReason::PowerLoss)
        } else if io.panic_button_pressed {
            Some(FaultReason::PanicButton)
        } else if !self.tuning.is_plausible(io.air_temp_c) {
            Some(FaultReason::SensorImplausible)
        } else {
            None
        }
    }

    fn next_state(&mut self, config: &ControlConfig, io: &IoSnapshot) -> Option<ControllerState> {
        if self.state == ControllerState::Fault {
            return None;
        }
        if let Some(reason) = self.fault_cause(io) {
            self.fault_reason = Some(reason);
            return Some(ControllerState::Fault);
        }

        let upper = config.target_temp_c + self.tuning.hysteresis_c;
        let lower = config.target_temp_c - self.tuning.hysteresis_c;
        let defrost_due =
            self.runtime_since_defrost >= Duration::from_secs(u64::from(config.defrost_interval_s));

        match self.state {
            ControllerState::Defrost => (self.defrost_elapsed
                >= Duration::from_secs(u64::from(config.defrost_duration_s)))
            .then_some(ControllerState::Idle),
            ControllerState::Cooling if defrost_due => Some(ControllerState::Defrost),
            ControllerState::Cooling => (io.air_temp_c <= lower).then_some(ControllerState::Idle),
            ControllerState::Idle if defrost_due => Some(ControllerState::Defrost),
            ControllerState::Idle => {
                let min_off = Duration::from_secs(u64::from(config.compressor_min_off_s));
                (io.air_temp_c > upper && self.compressor_off_for >= min_off)
                    .then_some(ControllerState::Cooling)
            }
            ControllerState::Fault => None,
        }
    }

    fn enter(&mut self, next: ControllerState) {
        let was_on = self.compressor_on();
        let from = self.state;
        self.state = next;
        self.in_state = Duration::ZERO;

        if was_on && !self.compressor_on() {
            self.compressor_off_for = Duration::ZERO;
        }
        match (from, next) {
            (_, ControllerState::Defrost) => self.defrost_elapsed = Duration::ZERO,
            (ControllerState::Defrost, ControllerState::Idle) => {
                self.defrost_elapsed = Duration::ZERO;
                self.runtime_since_defrost = Duration::ZERO;
            }
            (ControllerState::Fault, _) => {
                self.fault_reason = None;
                self.defrost_elapsed = Duration::ZERO;
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct Published {
    current: Arc<ControllerStatus>,
    previous: Arc<ControllerStatus>,
}

/// Latest and previous controller status behind one lock, so readers always
/// see a complete snapshot.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<Published>>,
}

impl StatusBoard {
    pub fn new(initial: ControllerStatus) -> Self {
        let initial = Arc::new(initial);
        Self {
            inner: Arc::new(RwLock::new(Published {
                current: Arc::clone(&initial),
                previous: initial,
            })),
        }
    }

    pub fn publish(&self, status: ControllerStatus) {
        let mut guard = self.inner.write();
        guard.previous = std::mem::replace(&mut guard.current, Arc::new(status));
    }

    pub fn latest(&self) -> Arc<ControllerStatus> {
        Arc::clone(&self.inner.read().current)
    }

    pub fn previous(&self) -> Arc<ControllerStatus> {
        Arc::clone(&self.inner.read().previous)
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(ControllerStatus::default())
    }
}
