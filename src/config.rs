use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Config {
    pub application: Application,
    pub database: Database,
    pub jwt: Jwt,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Application {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub allow_registration: bool,
    pub run_migration: bool,
}

impl Application {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Jwt {
    pub secret: SecretString,
    pub iss: SecretString,
    pub aud: SecretString,
    #[serde(
        default = "default_ttl_hours",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub ttl_hours: i64,
}

fn default_ttl_hours() -> i64 {
    24
}

/// `url` selects the backend by scheme, `sqlite:` or `mysql:`.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct Database {
    pub url: SecretString,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_connections: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_connections: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub busy_timeout_ms: u64,
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, anyhow::Error> {
        let base_path = std::env::current_dir()?;
        let config_directory = base_path.join("configuration");

        let environment: Environment = std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .try_into()
            .map_err(anyhow::Error::msg)?;

        let environment_filename = format!("{}.yaml", environment.as_str());

        let config = Figment::new()
            .merge(Yaml::file(config_directory.join("base.yaml")))
            .merge(Yaml::file(config_directory.join(environment_filename)))
            .merge(Env::raw().split("__"))
            .extract()?;

        Ok(config)
    }
}
