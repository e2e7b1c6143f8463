//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Validated config and IO snapshot stores."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Config and IO stores.
//!
//! Both stores hand out copies and validate every write against a candidate
//! copy first, so a rejected `set` leaves the stored value untouched.

use std::fmt;
use std::str::FromStr;

use rcc_common::ControlConfig;
use strum::{EnumString, IntoStaticStr};
use thiserror::Error;

pub const TARGET_TEMP_MIN_C: f64 = -40.0;
pub const TARGET_TEMP_MAX_C: f64 = 15.0;
pub const COMPRESSOR_MIN_OFF_MAX_S: u32 = 3_600;
pub const DEFROST_INTERVAL_MAX_S: u32 = 7 * 24 * 60 * 60;
pub const DEFROST_DURATION_MAX_S: u32 = 4 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("cannot parse `{value}` as a value for {field}")]
    BadValue { field: &'static str, value: String },
    #[error("{field}={value} rejected: {detail}")]
    InvalidRange {
        field: &'static str,
        value: String,
        detail: String,
    },
}

impl ValidationError {
    /// Wire reason reported in `ERR <reason>`.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::UnknownField(_) => "unknown_field",
            ValidationError::BadValue { .. } => "bad_value",
            ValidationError::InvalidRange { .. } => "invalid_range",
        }
    }
}

/// A typed field value as reported back in `ACK field=value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(u32),
    Flag(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(value) => write!(f, "{}", format_float(*value)),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Flag(value) => f.write_str(if *value { "1" } else { "0" }),
        }
    }
}

/// Render a float so it always carries a decimal point (`2.0`, `3.5`).
pub fn format_float(value: f64) -> String {
    let rendered = value.to_string();
    if value.is_finite() && !rendered.contains('.') {
        format!("{rendered}.0")
    } else {
        rendered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConfigField {
    TargetTempC,
    CompressorMinOffS,
    DefrostIntervalS,
    DefrostDurationS,
}

impl ConfigField {
    /// Order used by `CONFIG` responses.
    pub const ALL: [ConfigField; 4] = [
        ConfigField::TargetTempC,
        ConfigField::CompressorMinOffS,
        ConfigField::DefrostIntervalS,
        ConfigField::DefrostDurationS,
    ];

    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn read(self, config: &ControlConfig) -> FieldValue {
        match self {
            ConfigField::TargetTempC => FieldValue::Float(config.target_temp_c),
            ConfigField::CompressorMinOffS => FieldValue::Integer(config.compressor_min_off_s),
            ConfigField::DefrostIntervalS => FieldValue::Integer(config.defrost_interval_s),
            ConfigField::DefrostDurationS => FieldValue::Integer(config.defrost_duration_s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IoField {
    AirTempC,
    DoorOpen,
    PowerOk,
    MotionDetected,
    PanicButtonPressed,
}

impl IoField {
    /// Order used by `IO` responses.
    pub const ALL: [IoField; 5] = [
        IoField::AirTempC,
        IoField::DoorOpen,
        IoField::PowerOk,
        IoField::MotionDetected,
        IoField::PanicButtonPressed,
    ];

    pub fn key(self) -> &'static str {
        self.into()
    }

    /// Analog sensors are written with set-sensor, everything else with set-input.
    pub fn is_sensor(self) -> bool {
        matches!(self, IoField::AirTempC)
    }

    pub fn read(self, io: &IoSnapshot) -> FieldValue {
        match self {
            IoField::AirTempC => FieldValue::Float(io.air_temp_c),
            IoField::DoorOpen => FieldValue::Flag(io.door_open),
            IoField::PowerOk => FieldValue::Flag(io.power_ok),
            IoField::MotionDetected => FieldValue::Flag(io.motion_detected),
            IoField::PanicButtonPressed => FieldValue::Flag(io.panic_button_pressed),
        }
    }
}

fn parse_float(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ValidationError::BadValue {
            field,
            value: raw.to_string(),
        }),
    }
}

fn parse_seconds(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ValidationError::BadValue {
            field,
            value: raw.to_string(),
        })
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ValidationError::BadValue {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Check every setpoint bound, including the cross-field defrost constraint.
pub fn validate_config(config: &ControlConfig) -> Result<(), ValidationError> {
    let out_of_range = |field: ConfigField, detail: String| ValidationError::InvalidRange {
        field: field.key(),
        value: field.read(config).to_string(),
        detail,
    };

    if !(TARGET_TEMP_MIN_C..=TARGET_TEMP_MAX_C).contains(&config.target_temp_c) {
        return Err(out_of_range(
            ConfigField::TargetTempC,
            format!("must lie within {TARGET_TEMP_MIN_C}..={TARGET_TEMP_MAX_C} C"),
        ));
    }
    if config.compressor_min_off_s > COMPRESSOR_MIN_OFF_MAX_S {
        return Err(out_of_range(
            ConfigField::CompressorMinOffS,
            format!("must not exceed {COMPRESSOR_MIN_OFF_MAX_S} s"),
        ));
    }
    if config.defrost_interval_s == 0 || config.defrost_interval_s > DEFROST_INTERVAL_MAX_S {
        return Err(out_of_range(
            ConfigField::DefrostIntervalS,
            format!("must lie within 1..={DEFROST_INTERVAL_MAX_S} s"),
        ));
    }
    if config.defrost_duration_s > DEFROST_DURATION_MAX_S {
        return Err(out_of_range(
            ConfigField::DefrostDurationS,
            format!("must not exceed {DEFROST_DURATION_MAX_S} s"),
        ));
    }
    if config.defrost_duration_s >= config.defrost_interval_s {
        return Err(out_of_range(
            ConfigField::DefrostDurationS,
            format!(
                "defrost_duration_s must be shorter than defrost_interval_s ({})",
                config.defrost_interval_s
            ),
        ));
    }
    Ok(())
}

/// Holds the operator setpoints.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: ControlConfig,
}

impl ConfigStore {
    pub fn new(initial: ControlConfig) -> Result<Self, ValidationError> {
        validate_config(&initial)?;
        Ok(Self { current: initial })
    }

    pub fn get(&self) -> ControlConfig {
        self.current
    }

    /// Parse and apply one field. Returns the value now stored.
    pub fn set(&mut self, field: ConfigField, raw: &str) -> Result<FieldValue, ValidationError> {
        let key = field.key();
        let mut candidate = self.current;
        match field {
            ConfigField::TargetTempC => candidate.target_temp_c = parse_float(key, raw)?,
            ConfigField::CompressorMinOffS => {
                candidate.compressor_min_off_s = parse_seconds(key, raw)?
            }
            ConfigField::DefrostIntervalS => candidate.defrost_interval_s = parse_seconds(key, raw)?,
            ConfigField::DefrostDurationS => candidate.defrost_duration_s = parse_seconds(key, raw)?,
        }
        validate_config(&candidate)?;
        self.current = candidate;
        Ok(field.read(&self.current))
    }

    /// Resolve `key` and apply it.
    pub fn set_key(&mut self, key: &str, raw: &str) -> Result<(ConfigField, FieldValue), ValidationError> {
        let field = ConfigField::from_str(key.trim())
            .map_err(|_| ValidationError::UnknownField(key.trim().to_string()))?;
        let value = self.set(field, raw)?;
        Ok((field, value))
    }

    /// Swap in a whole config, e.g. one restored from disk.
    pub fn replace(&mut self, config: ControlConfig) -> Result<(), ValidationError> {
        validate_config(&config)?;
        self.current = config;
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            current: ControlConfig::default(),
        }
    }
}

/// Latest sensor and discrete input values, as written over the IO channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IoSnapshot {
    pub air_temp_c: f64,
    pub door_open: bool,
    pub power_ok: bool,
    pub motion_detected: bool,
    pub panic_button_pressed: bool,
}

impl Default for IoSnapshot {
    fn default() -> Self {
        Self {
            air_temp_c: 8.0,
            door_open: false,
            power_ok: true,
            motion_detected: false,
            panic_button_pressed: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IoStore {
    current: IoSnapshot,
}

impl IoStore {
    pub fn new(initial: IoSnapshot) -> Self {
        Self { current: initial }
    }

    pub fn get(&self) -> IoSnapshot {
        self.current
    }

    /// Parse and apply one field. Plausibility of `air_temp_c` is judged by
    /// the controller, not here; only non-finite readings are refused.
    pub fn set(&mut self, field: IoField, raw: &str) -> Result<FieldValue, ValidationError> {
        let key = field.key();
        let mut candidate = self.current;
        match field {
            IoField::AirTempC => candidate.air_temp_c = parse_float(key, raw)?,
            IoField::DoorOpen => candidate.door_open = parse_flag(key, raw)?,
            IoField::PowerOk => candidate.power_ok = parse_flag(key, raw)?,
            IoField::MotionDetected => candidate.motion_detected = parse_flag(key, raw)?,
            IoField::PanicButtonPressed => candidate.panic_button_pressed = parse_flag(key, raw)?,
        }
        self.current = candidate;
        Ok(field.read(&self.current))
    }

    pub fn set_key(&mut self, key: &str, raw: &str) -> Result<(IoField, FieldValue), ValidationError> {
        let field = IoField::from_str(key.trim())
            .map_err(|_| ValidationError::UnknownField(key.trim().to_string()))?;
        let value = self.set(field, raw)?;
        Ok((field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_post_write_value() {
        let mut store = ConfigStore::default();
        let value = store.set(ConfigField::TargetTempC, "3.50").unwrap();
        assert_eq!(value.to_string(), "3.5");
        assert_eq!(store.get().target_temp_c, 3.5);
    }

    #[test]
    fn integers_render_without_decimals_and_floats_with() {
        assert_eq!(FieldValue::Float(2.0).to_string(), "2.0");
        assert_eq!(FieldValue::Float(-18.25).to_string(), "-18.25");
        assert_eq!(FieldValue::Integer(120).to_string(), "120");
        assert_eq!(FieldValue::Flag(true).to_string(), "1");
    }

    #[test]
    fn rejected_set_leaves_store_unchanged() {
        let mut store = ConfigStore::default();
        let before = store.get();
        assert_eq!(
            store.set(ConfigField::TargetTempC, "warm").unwrap_err().reason(),
            "bad_value"
        );
        assert_eq!(
            store.set(ConfigField::TargetTempC, "30").unwrap_err().reason(),
            "invalid_range"
        );
        assert_eq!(
            store.set(ConfigField::CompressorMinOffS, "-5").unwrap_err().reason(),
            "bad_value"
        );
        assert_eq!(store.get(), before);
    }

    #[test]
    fn defrost_duration_must_stay_below_interval() {
        let mut store = ConfigStore::default();
        store.set(ConfigField::DefrostIntervalS, "3600").unwrap();
        store.set(ConfigField::DefrostDurationS, "600").unwrap();

        let err = store.set(ConfigField::DefrostDurationS, "3600").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidRange {
                field: "defrost_duration_s",
                ..
            }
        ));
        let err = store.set(ConfigField::DefrostIntervalS, "500").unwrap_err();
        assert_eq!(err.reason(), "invalid_range");
        assert_eq!(store.get().defrost_interval_s, 3600);
        assert_eq!(store.get().defrost_duration_s, 600);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let mut store = ConfigStore::default();
        let err = store.set_key("hysteresis_c", "0.5").unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("hysteresis_c".into()));
        assert_eq!(err.reason(), "unknown_field");

        let (field, value) = store.set_key("compressor_min_off_s", "300").unwrap();
        assert_eq!(field, ConfigField::CompressorMinOffS);
        assert_eq!(value, FieldValue::Integer(300));
    }

    #[test]
    fn replace_validates_the_whole_config() {
        let mut store = ConfigStore::default();
        let mut bad = ControlConfig::default();
        bad.defrost_duration_s = bad.defrost_interval_s;
        assert!(store.replace(bad).is_err());
        assert!(ConfigStore::new(bad).is_err());
        assert_eq!(store.get(), ControlConfig::default());
    }

    #[test]
    fn inputs_accept_only_zero_or_one() {
        let mut io = IoStore::default();
        assert_eq!(io.set(IoField::DoorOpen, "1").unwrap(), FieldValue::Flag(true));
        for raw in ["true", "2", "", "01"] {
            assert_eq!(
                io.set(IoField::PowerOk, raw).unwrap_err().reason(),
                "bad_value",
                "{raw:?}"
            );
        }
        assert!(io.get().power_ok);
        assert!(io.get().door_open);
    }

    #[test]
    fn sensor_accepts_implausible_but_finite_values() {
        let mut io = IoStore::default();
        assert_eq!(
            io.set(IoField::AirTempC, "150").unwrap(),
            FieldValue::Float(150.0)
        );
        assert_eq!(io.set(IoField::AirTempC, "NaN").unwrap_err().reason(), "bad_value");
        assert_eq!(io.set(IoField::AirTempC, "inf").unwrap_err().reason(), "bad_value");
        assert_eq!(io.get().air_temp_c, 150.0);
    }

    #[test]
    fn field_keys_follow_wire_names() {
        let keys: Vec<&str> = IoField::ALL.iter().map(|f| f.key()).collect();
        assert_eq!(
            keys,
            ["air_temp_c", "door_open", "power_ok", "motion_detected", "panic_button_pressed"]
        );
        assert_eq!(ConfigField::CompressorMinOffS.key(), "compressor_min_off_s");
        assert!(IoField::AirTempC.is_sensor());
        assert!(!IoField::PanicButtonPressed.is_sensor());
    }
}
