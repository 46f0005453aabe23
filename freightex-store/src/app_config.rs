use std::env;

use serde::Deserialize;

use freightex_core::money::RateTable;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub business_rules: BusinessRules,
    pub geo: GeoRules,
    /// Injected conversion rates so tests can substitute deterministic
    /// values instead of ambient constants.
    #[serde(default)]
    pub rates: RateTable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Handshake lifetime in minutes. Default: 30.
    #[serde(default = "default_agreement_ttl_minutes")]
    pub agreement_ttl_minutes: i64,
    /// Offer lifetime in hours. Default: 72.
    #[serde(default = "default_offer_ttl_hours")]
    pub offer_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeoRules {
    /// ISO country codes listings may originate from or terminate in.
    pub supported_countries: Vec<String>,
}

fn default_agreement_ttl_minutes() -> i64 {
    30
}

fn default_offer_ttl_hours() -> i64 {
    72
}

impl BusinessRules {
    pub fn agreement_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.agreement_ttl_minutes)
    }

    pub fn offer_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.offer_ttl_hours)
    }
}

impl GeoRules {
    pub fn supports_country(&self, code: &str) -> bool {
        self.supported_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            business_rules: BusinessRules {
                agreement_ttl_minutes: default_agreement_ttl_minutes(),
                offer_ttl_hours: default_offer_ttl_hours(),
            },
            geo: GeoRules {
                supported_countries: vec![
                    "UZ".to_string(),
                    "KZ".to_string(),
                    "RU".to_string(),
                    "KG".to_string(),
                    "TJ".to_string(),
                ],
            },
            rates: RateTable::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // `FREIGHTEX__BUSINESS_RULES__AGREEMENT_TTL_MINUTES=45` etc.
            .add_source(config::Environment::with_prefix("FREIGHTEX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
