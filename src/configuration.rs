use serde_aux::field_attributes::{
    deserialize_bool_from_anything, deserialize_number_from_string,
};

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub browser: BrowserSettings,
    pub pacing: PacingSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct BrowserSettings {
    /// Address of the chromedriver endpoint the session connects to.
    pub webdriver_url: String,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub headless: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct PacingSettings {
    /// Base inter-request delay window, in seconds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_min_secs: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_max_secs: f64,
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

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
