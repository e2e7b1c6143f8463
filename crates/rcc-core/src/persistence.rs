//! ---
//! rcc_section: "03-persistence-logging"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Setpoint persistence across daemon restarts."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rcc_common::ControlConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::store::{validate_config, ValidationError};

/// Current envelope schema version.
pub const SETPOINTS_VERSION: u16 = 1;

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("setpoint file hash mismatch")]
    HashMismatch,
    #[error("setpoint file version {0} is not supported")]
    UnsupportedVersion(u16),
    #[error("stored setpoints are invalid: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SetpointEnvelope {
    version: u16,
    saved_at: DateTime<Utc>,
    hash: String,
    config: ControlConfig,
}

/// Write setpoints to `path`, creating parent directories as needed.
pub fn save_setpoints(config: &ControlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let envelope = SetpointEnvelope {
        version: SETPOINTS_VERSION,
        saved_at: Utc::now(),
        hash: compute_hash(config)?,
        config: *config,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &envelope)?;
    writer.flush()?;
    debug!(path = %path.display(), "setpoints saved");
    Ok(())
}

/// Load setpoints saved by [`save_setpoints`]. A missing file is `Ok(None)`.
pub fn load_setpoints(path: &Path) -> Result<Option<ControlConfig>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let envelope: SetpointEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version != SETPOINTS_VERSION {
        return Err(PersistenceError::UnsupportedVersion(envelope.version));
    }
    if envelope.hash != compute_hash(&envelope.config)? {
        return Err(PersistenceError::HashMismatch);
    }
    validate_config(&envelope.config)?;
    debug!(path = %path.display(), saved_at = %envelope.saved_at, "setpoints loaded");
    Ok(Some(envelope.config))
}

fn compute_hash(config: &ControlConfig) -> Result<String> {
    let serialized = serde_json::to_vec(config)?;
    Ok(hex::encode(Sha256::digest(serialized)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/setpoints.json");
        let config = ControlConfig {
            target_temp_c: -2.5,
            compressor_min_off_s: 300,
            ..ControlConfig::default()
        };

        save_setpoints(&config, &path).unwrap();
        assert_eq!(load_setpoints(&path).unwrap(), Some(config));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_setpoints(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn tampered_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("setpoints.json");
        save_setpoints(&ControlConfig::default(), &path).unwrap();

        let mut envelope: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        envelope["config"]["target_temp_c"] = serde_json::json!(9.0);
        fs::write(&path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        assert!(matches!(
            load_setpoints(&path),
            Err(PersistenceError::HashMismatch)
        ));
    }

    #[test]
    fn invalid_setpoints_are_rejected_even_with_matching_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("setpoints.json");
        let bad = ControlConfig {
            defrost_interval_s: 600,
            defrost_duration_s: 900,
            ..ControlConfig::default()
        };
        save_setpoints(&bad, &path).unwrap();
        assert!(matches!(
            load_setpoints(&path),
            Err(PersistenceError::Invalid(_))
        ));
    }
}
