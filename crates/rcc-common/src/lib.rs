//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Shared configuration and logging primitives."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Shared primitives for the refrigeration controller workspace: the TOML
//! application configuration, the operator setpoint model and tracing setup.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ControlConfig, ControllerTuning, LoadedAppConfig, LoggingConfig,
    PersistenceConfig, RuntimeConfig, WalkInDimensions,
};
pub use logging::{init_tracing, LogFormat};
