use std::env;

use chrono::FixedOffset;

use crate::engine::optimizer::RoutingParams;
use crate::error::AppError;
use crate::geo::Coordinate;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub depot: Coordinate,
    pub average_speed_kmh: f64,
    pub per_stop_minutes: u32,
    pub dispatch_hour: u32,
    /// Offset of the single deployment time zone. Every date in the system is
    /// resolved against it.
    pub utc_offset_minutes: i32,
    pub expansion_hour: u32,
    pub expansion_lead_days: u32,
    pub expansion_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            depot: Coordinate::DEFAULT_DEPOT,
            average_speed_kmh: 30.0,
            per_stop_minutes: 5,
            dispatch_hour: 6,
            utc_offset_minutes: 330,
            expansion_hour: 23,
            expansion_lead_days: 1,
            expansion_enabled: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let depot_lat = parse_or_default("DEPOT_LAT", defaults.depot.lat)?;
        let depot_lng = parse_or_default("DEPOT_LNG", defaults.depot.lng)?;
        let depot = Coordinate::new(depot_lat, depot_lng).ok_or_else(|| {
            AppError::Internal(format!("invalid depot coordinate: {depot_lat},{depot_lng}"))
        })?;

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            depot,
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            per_stop_minutes: parse_or_default("PER_STOP_MINUTES", defaults.per_stop_minutes)?,
            dispatch_hour: parse_or_default("DISPATCH_HOUR", defaults.dispatch_hour)?,
            utc_offset_minutes: parse_or_default(
                "UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
            )?,
            expansion_hour: parse_or_default("EXPANSION_HOUR", defaults.expansion_hour)?,
            expansion_lead_days: parse_or_default(
                "EXPANSION_LEAD_DAYS",
                defaults.expansion_lead_days,
            )?,
            expansion_enabled: parse_or_default("EXPANSION_ENABLED", defaults.expansion_enabled)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(AppError::Internal(
                "AVERAGE_SPEED_KMH must be a positive number".to_string(),
            ));
        }
        if self.dispatch_hour > 23 {
            return Err(AppError::Internal("DISPATCH_HOUR must be 0..=23".to_string()));
        }
        if self.expansion_hour > 23 {
            return Err(AppError::Internal("EXPANSION_HOUR must be 0..=23".to_string()));
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<FixedOffset, AppError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    pub fn routing_params(&self) -> RoutingParams {
        RoutingParams {
            average_speed_kmh: self.average_speed_kmh,
            per_stop_minutes: self.per_stop_minutes,
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

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routing_params().per_stop_minutes, 5);
    }

    #[test]
    fn rejects_non_positive_speed() {
        let config = Config {
            average_speed_kmh: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let config = Config {
            utc_offset_minutes: 24 * 60,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
