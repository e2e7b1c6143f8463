//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Cooperative control loop tying channels, stores and controller together."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rcc_common::{AppConfig, ControlConfig, RuntimeConfig};
use rcc_transport::Transport;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::ChannelDriver;
use crate::controller::{ControllerStatus, RefrigerationController, StatusBoard, TickOutcome};
use crate::dispatcher::{Channel, DispatchContext};
use crate::scheduling::RateLimiter;
use crate::store::{ConfigStore, IoSnapshot, IoStore, ValidationError};

/// Out-of-band requests from the operator console or the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    AcknowledgeFault,
    Shutdown,
}

/// The whole controller: both channel drivers, both stores, the state
/// machine and the published status.
///
/// Everything runs on one task. [`ColdRoomRuntime::tick`] services both
/// channels before the controller evaluates, so a request that arrived
/// before the tick influences that tick's decision.
#[derive(Debug)]
pub struct ColdRoomRuntime<T> {
    settings: RuntimeConfig,
    config: ConfigStore,
    io: IoStore,
    controller: RefrigerationController,
    status: StatusBoard,
    monitor: ChannelDriver<T>,
    io_channel: ChannelDriver<T>,
}

impl<T: Transport> ColdRoomRuntime<T> {
    pub fn new(app: &AppConfig, monitor: T, io: T) -> std::result::Result<Self, ValidationError> {
        let controller = RefrigerationController::new(app.controller).with_walk_in(app.walk_in);
        let status = StatusBoard::new(controller.status());
        let stall_limit = app.runtime.decoder_stall_limit;
        Ok(Self {
            settings: app.runtime.clone(),
            config: ConfigStore::new(app.setpoints)?,
            io: IoStore::default(),
            controller,
            status,
            monitor: ChannelDriver::new(Channel::Monitor, monitor, stall_limit),
            io_channel: ChannelDriver::new(Channel::IoMimic, io, stall_limit),
        })
    }

    /// Replace the setpoints wholesale, e.g. with values restored from disk.
    pub fn restore_setpoints(&mut self, config: ControlConfig) -> std::result::Result<(), ValidationError> {
        self.config.replace(config)
    }

    pub fn config(&self) -> ControlConfig {
        self.config.get()
    }

    pub fn io(&self) -> IoSnapshot {
        self.io.get()
    }

    pub fn status(&self) -> Arc<ControllerStatus> {
        self.status.latest()
    }

    /// Handle for readers outside the loop.
    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn monitor(&self) -> &ChannelDriver<T> {
        &self.monitor
    }

    pub fn io_channel(&self) -> &ChannelDriver<T> {
        &self.io_channel
    }

    /// Poll both UARTs and dispatch every complete request. Transport
    /// failures are logged and never stop the loop.
    pub fn service_channels(&mut self) -> usize {
        let mut ctx = DispatchContext {
            config: &mut self.config,
            io: &mut self.io,
            status: &self.status,
        };
        let mut handled = 0;
        for driver in [&mut self.monitor, &mut self.io_channel] {
            match driver.poll(&mut ctx) {
                Ok(count) => handled += count,
                Err(err) => warn!(channel = %driver.channel(), error = %err, "transport failure"),
            }
        }
        handled
    }

    /// One control period: service channels, evaluate the controller,
    /// publish the new status.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        let handled = self.service_channels();
        let outcome = self
            .controller
            .tick(&self.config.get(), &self.io.get(), elapsed);
        self.status.publish(outcome.status.clone());
        debug!(
            state = %outcome.status.state,
            handled,
            seconds_in_state = outcome.status.seconds_in_state,
            "tick complete"
        );
        if outcome.transition.is_some() {
            self.announce(&outcome.status);
        }
        outcome
    }

    /// Apply an operator fault clear. Returns whether a fault was cleared.
    pub fn acknowledge_fault(&mut self) -> bool {
        if !self.controller.acknowledge_fault() {
            debug!("fault acknowledgement ignored outside fault state");
            return false;
        }
        let status = self.controller.status();
        self.status.publish(status.clone());
        self.announce(&status);
        true
    }

    fn announce(&self, status: &ControllerStatus) {
        if !self.settings.announce_status_changes {
            return;
        }
        if let Err(err) = self.monitor.announce(status) {
            warn!(error = %err, "status announcement failed");
        }
    }

    /// Drive the loop until [`OperatorSignal::Shutdown`] arrives or every
    /// signal sender is dropped.
    pub async fn run(&mut self, mut signals: mpsc::Receiver<OperatorSignal>) -> Result<()> {
        let mut control = RateLimiter::new(self.settings.tick_interval);
        let mut polling = RateLimiter::new(self.settings.poll_interval);
        info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            "control loop started"
        );

        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(OperatorSignal::AcknowledgeFault) => {
                        self.acknowledge_fault();
                    }
                    Some(OperatorSignal::Shutdown) | None => {
                        info!("control loop stopping");
                        break;
                    }
                },
                _ = control.tick() => {
                    self.tick(control.period());
                }
                _ = polling.tick() => {
                    self.service_channels();
                }
            }
        }
        Ok(())
    }
}
