//! Sensor probe module
//!
//! Collaborator contracts for reading the live source value and the
//! optional gate signal, plus file-backed implementations that parse
//! sysfs-style text files. An unreadable or unparseable file reads as
//! "unavailable", which the aggregation core degrades to 0 W.

use crate::core::{GateState, Result};
use std::fs;
use std::path::PathBuf;

/// Current instantaneous reading; `Ok(None)` means unavailable
pub trait PowerProbe {
    fn read_watts(&self) -> Result<Option<f64>>;

    /// Name of this probe, for logging
    fn name(&self) -> &str;
}

/// Current gate signal state
pub trait GateProbe {
    fn read_gate(&self) -> GateState;
}

/// Reads the instantaneous power (W) from a plain text file
pub struct FilePowerProbe {
    path: PathBuf,
    name: String,
}

impl FilePowerProbe {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            name: name.to_string(),
        }
    }
}

impl PowerProbe for FilePowerProbe {
    fn read_watts(&self) -> Result<Option<f64>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().parse::<f64>().ok()),
            Err(e) => {
                log::debug!("{}: power file unreadable: {}", self.name, e);
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Reads the gate signal from a plain text file.
///
/// "on"/"true"/"1" opens the gate, "off"/"false"/"0" closes it;
/// anything else (including a missing file) is unavailable.
pub struct FileGateProbe {
    path: PathBuf,
}

impl FileGateProbe {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }
}

impl GateProbe for FileGateProbe {
    fn read_gate(&self) -> GateState {
        match fs::read_to_string(&self.path) {
            Ok(content) => match content.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => GateState::On,
                "off" | "false" | "0" => GateState::Off,
                other => {
                    log::debug!("Unrecognized gate value {:?}", other);
                    GateState::Unavailable
                }
            },
            Err(_) => GateState::Unavailable,
        }
    }
}

/// Fixed-value probe for tests and demos
pub struct FixedProbe {
    watts: Option<f64>,
}

impl FixedProbe {
    pub fn new(watts: f64) -> Self {
        Self { watts: Some(watts) }
    }

    pub fn unavailable() -> Self {
        Self { watts: None }
    }
}

impl PowerProbe for FixedProbe {
    fn read_watts(&self) -> Result<Option<f64>> {
        Ok(self.watts)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(content: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "pmt-probe-{}-{}",
            std::process::id(),
            content.len()
        ));
        let mut f = fs::File::create(&path).unwrap();
        write!(f, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_file_power_probe_parses_watts() {
        let path = temp_file("1234.5\n");
        let probe = FilePowerProbe::new("t", path.to_str().unwrap());
        assert_eq!(probe.read_watts().unwrap(), Some(1234.5));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_file_power_probe_garbage_is_unavailable() {
        let path = temp_file("not-a-number");
        let probe = FilePowerProbe::new("t", path.to_str().unwrap());
        assert_eq!(probe.read_watts().unwrap(), None);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let probe = FilePowerProbe::new("t", "/nonexistent/pmt-power");
        assert_eq!(probe.read_watts().unwrap(), None);

        let gate = FileGateProbe::new("/nonexistent/pmt-gate");
        assert_eq!(gate.read_gate(), GateState::Unavailable);
    }

    #[test]
    fn test_gate_probe_values() {
        for (content, expected) in [
            ("on\n", GateState::On),
            ("1", GateState::On),
            ("OFF", GateState::Off),
            ("0\n", GateState::Off),
            ("maybe", GateState::Unavailable),
        ] {
            let path = temp_file(content);
            let probe = FileGateProbe::new(path.to_str().unwrap());
            assert_eq!(probe.read_gate(), expected, "content {:?}", content);
            let _ = fs::remove_file(path);
        }
    }
}
