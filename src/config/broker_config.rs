//! Upstream-adapter credentials and endpoints (§6 external interfaces),
//! one env-backed config struct per broker.

use std::env;

#[derive(Debug, Clone)]
pub struct KiwoomEnvConfig {
    pub domain: String,
    pub access_token: String,
}

impl KiwoomEnvConfig {
    pub fn from_env() -> Self {
        Self {
            domain: env::var("KIWOOM_DOMAIN").unwrap_or_else(|_| "https://api.kiwoom.com".to_string()),
            access_token: env::var("KIWOOM_ACCESS_TOKEN").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaishinBridgeEnvConfig {
    pub base_url: String,
}

impl DaishinBridgeEnvConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("DAISHIN_BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kiwoom_config_defaults_to_the_production_domain() {
        env::remove_var("KIWOOM_DOMAIN");
        let cfg = KiwoomEnvConfig::from_env();
        assert_eq!(cfg.domain, "https://api.kiwoom.com");
    }
}
