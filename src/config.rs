use serde::Deserialize;

/// Application configuration, sourced from the environment (and `.env` in
/// development). `DATABASE_URL` selects the relational backend; the admin
/// credentials are only used to seed the first principal.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_admin_name")]
    pub admin_name: String,

    /// First-run convenience default; override in any real deployment.
    #[serde(default = "default_admin_api_key")]
    pub admin_api_key: String,
}

fn default_port() -> u16 {
    8080
}

fn default_admin_name() -> String {
    "admin".to_string()
}

fn default_admin_api_key() -> String {
    "175b6f1fc25c47e69ff73442f96298ae".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
