//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Controller core crate root."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Walk-in refrigeration controller core.
//!
//! Requests arrive on two UART channels, are decoded by `rcc-sck`, and are
//! dispatched against the config and IO stores. Once per tick the state
//! machine reads both stores and publishes a fresh [`ControllerStatus`].

pub mod channel;
pub mod controller;
pub mod dispatcher;
pub mod persistence;
pub mod runtime;
pub mod scheduling;
pub mod store;

pub use channel::{ChannelDriver, ChannelStats};
pub use controller::{
    ControllerState, ControllerStatus, FaultReason, RefrigerationController, StatusBoard,
    TickOutcome, Transition,
};
pub use dispatcher::{dispatch, Channel, DispatchContext, ErrorReason, Reply, Request};
pub use persistence::{load_setpoints, save_setpoints, PersistenceError};
pub use runtime::{ColdRoomRuntime, OperatorSignal};
pub use store::{
    ConfigField, ConfigStore, FieldValue, IoField, IoSnapshot, IoStore, ValidationError,
};
