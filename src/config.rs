use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::tariff::TariffTable;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub rematch_queue_size: usize,
    pub event_buffer_size: usize,
    pub dispatch: DispatchConfig,
    pub tariffs: TariffTable,
}

/// Matching and presence policy shared by the registry, matcher and rematch engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub staleness_window: Duration,
    pub radius_steps_km: Vec<f64>,
    pub max_match_attempts: u32,
    pub retry_delay: Duration,
    pub pending_timeout: Duration,
    pub expiry_sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(300),
            radius_steps_km: vec![2.0, 5.0, 10.0],
            max_match_attempts: 5,
            retry_delay: Duration::from_millis(2_000),
            pending_timeout: Duration::from_secs(900),
            expiry_sweep_interval: Duration::from_secs(30),
        }
    }
}

impl DispatchConfig {
    pub fn max_radius_km(&self) -> f64 {
        self.radius_steps_km.iter().copied().fold(0.0, f64::max)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let dispatch = DispatchConfig {
            staleness_window: Duration::from_secs(parse_or_default("DRIVER_STALENESS_SECS", 300)?),
            radius_steps_km: parse_radii("MATCH_RADII_KM", &[2.0, 5.0, 10.0])?,
            max_match_attempts: parse_or_default("MATCH_MAX_ATTEMPTS", 5)?,
            retry_delay: Duration::from_millis(parse_or_default("MATCH_RETRY_DELAY_MS", 2_000)?),
            pending_timeout: Duration::from_secs(parse_or_default("PENDING_TIMEOUT_SECS", 900)?),
            expiry_sweep_interval: Duration::from_secs(parse_or_default("EXPIRY_SWEEP_SECS", 30)?),
        };

        let currency = env::var("FARE_CURRENCY").unwrap_or_else(|_| "PHP".to_string());

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            rematch_queue_size: parse_or_default("REMATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch,
            tariffs: TariffTable::default().with_currency(currency),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            rematch_queue_size: 1024,
            event_buffer_size: 1024,
            dispatch: DispatchConfig::default(),
            tariffs: TariffTable::default(),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn parse_radii(key: &str, default: &[f64]) -> Result<Vec<f64>, AppError> {
    match env::var(key) {
        Ok(raw) => radii_from_str(&raw).map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default.to_vec()),
    }
}

/// Parses "2,5,10" into ascending, positive radius steps.
fn radii_from_str(raw: &str) -> Result<Vec<f64>, String> {
    let mut steps = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>().map_err(|err| format!("{part}: {err}")))
        .collect::<Result<Vec<_>, _>>()?;

    if steps.is_empty() {
        return Err("at least one radius step is required".to_string());
    }
    if steps.iter().any(|step| !step.is_finite() || *step <= 0.0) {
        return Err("radius steps must be > 0".to_string());
    }

    steps.sort_by(f64::total_cmp);
    steps.dedup();
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::{radii_from_str, DispatchConfig};

    #[test]
    fn radii_are_sorted_and_deduplicated() {
        assert_eq!(radii_from_str("10, 2,5,2").unwrap(), vec![2.0, 5.0, 10.0]);
    }

    #[test]
    fn bad_radii_are_rejected() {
        assert!(radii_from_str("").is_err());
        assert!(radii_from_str("2,-1").is_err());
        assert!(radii_from_str("2,abc").is_err());
    }

    #[test]
    fn max_radius_is_largest_step() {
        assert_eq!(DispatchConfig::default().max_radius_km(), 10.0);
    }
}
