use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::algorithms::{MultilaterationConfig, NelderMeadConfig, PathLossModel};
use crate::core::{
    BoundingBox, DEFAULT_CALIBRATION_BEACON_NAME, DEFAULT_SAMPLING_ATTEMPTS, MAX_TIMESTAMP_AGE_DAYS, MAX_WINDOW_SECS,
    MIN_RECEIVERS_FOR_FIX,
};
use crate::processing::StoreConfig;
use crate::utils::logging::LogConfig;
use crate::validation::ConfigError;

/// System-wide configuration, loaded from TOML. Every section and field is
/// optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// RSSI to distance conversion
    pub path_loss: PathLossModel,
    /// Scan store windows and validity threshold
    pub store: StoreConfig,
    /// Position solver
    pub solver: SolverConfig,
    /// Rejection sampling inside rooms
    pub sampling: SamplingConfig,
    pub calibration: CalibrationConfig,
    pub logging: LogConfig,
    /// Input and output files
    pub paths: PathsConfig,
}

/// Solver settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    #[serde(flatten)]
    pub nelder_mead: NelderMeadConfig,
    /// Located receivers required before a fix is attempted
    pub min_receivers: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            nelder_mead: NelderMeadConfig::default(),
            min_receivers: MIN_RECEIVERS_FOR_FIX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Draws before giving up on finding a point inside a room
    pub max_attempts: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_SAMPLING_ATTEMPTS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Advertised name that marks scans of the calibration beacon
    pub beacon_name: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { beacon_name: DEFAULT_CALIBRATION_BEACON_NAME.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Floor-plan TOML document
    pub floor_plan: Option<PathBuf>,
    /// Persisted receiver registry (JSON)
    pub receivers: Option<PathBuf>,
    /// JSON-lines file receiving calibration samples
    pub calibration_log: Option<PathBuf>,
}

/// Outcome of [`SystemConfig::validate`]
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigError>,
    /// Accepted but suspicious settings
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Store windows must be non-zero and no longer than [`MAX_WINDOW_SECS`]
fn window_error(parameter: &str, secs: u64) -> Option<ConfigError> {
    if secs == 0 {
        Some(ConfigError::invalid(parameter, 0, "must be greater than zero"))
    } else if secs > MAX_WINDOW_SECS {
        Some(ConfigError::invalid(parameter, secs, &format!("must not exceed {} seconds", MAX_WINDOW_SECS)))
    } else {
        None
    }
}

impl SystemConfig {
    /// Read, parse and validate a configuration file.
    ///
    /// Fails with the first validation error; warnings are logged.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Path::new("<inline config>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        let report = config.validate();
        for warning in &report.warnings {
            warn!(path = %path.display(), "{}", warning);
        }
        match report.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(config),
        }
    }

    /// Check every parameter and report all problems at once
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let exponent = self.path_loss.path_loss_exponent;
        if !(exponent.is_finite() && exponent > 0.0) {
            errors.push(ConfigError::invalid(
                "path_loss.path_loss_exponent",
                exponent,
                "must be positive and finite",
            ));
        } else if !(1.5..=6.0).contains(&exponent) {
            warnings.push(format!("path-loss exponent {} is outside the usual indoor range 1.5-6", exponent));
        }
        if !self.path_loss.tx_power_dbm.is_finite() {
            errors.push(ConfigError::invalid("path_loss.tx_power_dbm", self.path_loss.tx_power_dbm, "must be finite"));
        }

        errors.extend(window_error("store.stale_window_secs", self.store.stale_window_secs));
        match window_error("store.validity_window_secs", self.store.validity_window_secs) {
            Some(error) => errors.push(error),
            None if self.store.validity_window_secs > self.store.stale_window_secs => warnings
                .push("validity window exceeds the stale window; beacons are evicted before they expire".to_string()),
            None => {}
        }
        errors.extend(window_error("store.estimation_window_secs", self.store.estimation_window_secs));
        let max_age = self.store.max_timestamp_age_days;
        if !(1..=MAX_TIMESTAMP_AGE_DAYS).contains(&max_age) {
            errors.push(ConfigError::invalid(
                "store.max_timestamp_age_days",
                max_age,
                &format!("must be between 1 and {}", MAX_TIMESTAMP_AGE_DAYS),
            ));
        }

        if self.solver.min_receivers < MIN_RECEIVERS_FOR_FIX {
            errors.push(ConfigError::invalid(
                "solver.min_receivers",
                self.solver.min_receivers,
                "at least 3 receivers are required for a 2-D fix",
            ));
        }
        if self.solver.nelder_mead.max_iterations == 0 {
            errors.push(ConfigError::invalid("solver.max_iterations", 0, "must be greater than zero"));
        }
        let tolerance = self.solver.nelder_mead.tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            errors.push(ConfigError::invalid("solver.tolerance", tolerance, "must be positive and finite"));
        }
        let step = self.solver.nelder_mead.initial_step_fraction;
        if !(step > 0.0 && step <= 1.0) {
            errors.push(ConfigError::invalid("solver.initial_step_fraction", step, "must be in (0, 1]"));
        }

        if self.sampling.max_attempts == 0 {
            errors.push(ConfigError::invalid("sampling.max_attempts", 0, "must be greater than zero"));
        }
        if self.calibration.beacon_name.is_empty() {
            errors.push(ConfigError::invalid("calibration.beacon_name", "\"\"", "must not be empty"));
        }
        if let (Some(filter), Some(reason)) = (&self.logging.filter, self.logging.filter_error()) {
            errors.push(ConfigError::invalid("logging.filter", filter, &reason));
        }

        ValidationReport { errors, warnings }
    }

    /// Estimator parameters searching inside `bounds`
    pub fn multilateration_config(&self, bounds: BoundingBox) -> MultilaterationConfig {
        MultilaterationConfig {
            path_loss: self.path_loss,
            solver: self.solver.nelder_mead,
            min_receivers: self.solver.min_receivers,
            bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        let report = config.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert_eq!(config.store.stale_window_secs, 1800);
        assert_eq!(config.store.validity_window_secs, 300);
        assert_eq!(config.store.rssi_threshold_dbm, -200);
        assert_eq!(config.path_loss.tx_power_dbm, -50.0);
        assert_eq!(config.solver.min_receivers, 3);
        assert_eq!(config.calibration.beacon_name, "ble_calibration");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let text = r#"
            [path_loss]
            path_loss_exponent = 2.7

            [store]
            rssi_threshold_dbm = -85

            [solver]
            max_iterations = 200
            min_receivers = 4

            [paths]
            floor_plan = "config/cafeteria.toml"
        "#;
        let config = SystemConfig::from_toml_str(text).unwrap();
        assert_eq!(config.path_loss.path_loss_exponent, 2.7);
        assert_eq!(config.path_loss.tx_power_dbm, -50.0);
        assert_eq!(config.store.rssi_threshold_dbm, -85);
        assert_eq!(config.store.stale_window_secs, 1800);
        assert_eq!(config.solver.nelder_mead.max_iterations, 200);
        assert_eq!(config.solver.nelder_mead.tolerance, 1e-10);
        assert_eq!(config.solver.min_receivers, 4);
        assert_eq!(config.paths.floor_plan, Some(PathBuf::from("config/cafeteria.toml")));
        assert_eq!(config.paths.receivers, None);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = SystemConfig::default();
        config.path_loss.path_loss_exponent = 0.0;
        config.store.validity_window_secs = 0;
        config.solver.min_receivers = 2;
        config.sampling.max_attempts = 0;

        let report = config.validate();
        let parameters: Vec<String> = report
            .errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidParameter { parameter, .. } => Some(parameter.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            parameters,
            vec![
                "path_loss.path_loss_exponent",
                "store.validity_window_secs",
                "solver.min_receivers",
                "sampling.max_attempts",
            ]
        );
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let text = "[store]\nstale_window_secs = 1000000000000000\n";
        match SystemConfig::from_toml_str(text) {
            Err(ConfigError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "store.stale_window_secs"),
            other => panic!("expected invalid parameter, got {:?}", other),
        }

        let mut config = SystemConfig::default();
        config.store.validity_window_secs = u64::MAX;
        config.store.estimation_window_secs = MAX_WINDOW_SECS + 1;
        config.store.max_timestamp_age_days = i64::MAX;
        let parameters: Vec<String> = config
            .validate()
            .errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidParameter { parameter, .. } => Some(parameter.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            parameters,
            vec!["store.validity_window_secs", "store.estimation_window_secs", "store.max_timestamp_age_days"]
        );

        config = SystemConfig::default();
        config.store.stale_window_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_invalid_log_filter_rejected() {
        let text = "[logging]\nfilter = \"beacon_locator=loud\"\n";
        match SystemConfig::from_toml_str(text) {
            Err(ConfigError::InvalidParameter { parameter, value, .. }) => {
                assert_eq!(parameter, "logging.filter");
                assert_eq!(value, "beacon_locator=loud");
            }
            other => panic!("expected invalid parameter, got {:?}", other),
        }

        let text = "[logging]\nfilter = \"beacon_locator::processing=debug,warn\"\n";
        assert!(SystemConfig::from_toml_str(text).is_ok());
    }

    #[test]
    fn test_unusual_exponent_is_a_warning() {
        let mut config = SystemConfig::default();
        config.path_loss.path_loss_exponent = 8.0;
        let report = config.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_file_fails_to_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[solver]\nmin_receivers = 1").unwrap();
        match SystemConfig::load(file.path()) {
            Err(ConfigError::InvalidParameter { parameter, value, .. }) => {
                assert_eq!(parameter, "solver.min_receivers");
                assert_eq!(value, "1");
            }
            other => panic!("expected invalid parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_multilateration_config_uses_sections() {
        let mut config = SystemConfig::default();
        config.path_loss.tx_power_dbm = -59.0;
        let bounds = BoundingBox::new(0.0, 0.0, 30.0, 20.0);
        let ml = config.multilateration_config(bounds);
        assert_eq!(ml.path_loss.tx_power_dbm, -59.0);
        assert_eq!(ml.bounds, bounds);
        assert_eq!(ml.min_receivers, 3);
    }
}
