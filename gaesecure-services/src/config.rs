use std::env;

pub const VALIDATE_CERTIFICATES_VAR: &str = "GAESECURE_VALIDATE_CERTIFICATES";
pub const LOG_FILTER_VAR: &str = "GAESECURE_LOG";

#[derive(Clone, Debug)]
pub struct Settings {
    /// Apply the urlfetch certificate patch at startup.
    pub validate_certificates: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validate_certificates: true,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds settings from any variable source, e.g. the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            validate_certificates: lookup(VALIDATE_CERTIFICATES_VAR)
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.validate_certificates),
            log_filter: lookup(LOG_FILTER_VAR)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_filter),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}
