use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, a TOML file and environment variables.
    ///
    /// A missing TOML file is not an error. `COT_`-prefixed variables use `__`
    /// for nesting (`COT_DATABASE__URL`); `DB_URL_COT` and
    /// `POSTGRES_SCHEMA_COT` are honoured last.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("COT_").split("__"))
            .merge(
                Env::raw()
                    .only(&["DB_URL_COT"])
                    .map(|_| "database.url".into()),
            )
            .merge(
                Env::raw()
                    .only(&["POSTGRES_SCHEMA_COT"])
                    .map(|_| "database.schema".into()),
            )
    }
}
