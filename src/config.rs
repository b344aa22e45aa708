use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub rust_log: String,
    /// Fraction of an exam's total marks a student needs to pass.
    pub pass_fraction: f64,
    /// Per-student CO score (percent) at or above which the student attains the CO.
    pub attain_threshold: f64,
    /// Share of direct attainment in a PO total when an indirect value exists.
    pub direct_weight: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            rust_log: "info".to_string(),
            pass_fraction: 0.4,
            attain_threshold: 60.0,
            direct_weight: 0.8,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Config::default();

        let workspace = env::var("OUTCOMESD_WORKSPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| defaults.rust_log.clone());

        Self {
            workspace,
            rust_log,
            pass_fraction: fraction_var("OUTCOMESD_PASS_FRACTION", defaults.pass_fraction, 0.0, 1.0),
            attain_threshold: fraction_var(
                "OUTCOMESD_ATTAIN_THRESHOLD",
                defaults.attain_threshold,
                0.0,
                100.0,
            ),
            direct_weight: fraction_var("OUTCOMESD_DIRECT_WEIGHT", defaults.direct_weight, 0.0, 1.0),
        }
    }
}

// The subscriber is not installed yet when this runs, so problems go to stderr directly.
fn fraction_var(key: &str, default: f64, min: f64, max: f64) -> f64 {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= min && v <= max => v,
        _ => {
            eprintln!("{key}={raw:?} is not a number in [{min}, {max}]; using {default}");
            default
        }
    }
}
