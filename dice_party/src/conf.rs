use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Conf {
    /// Name used in logs
    pub id: String,
    /// The log format to use - "json" or "full" (default)
    pub log_format: String,
    /// Address the websocket / HTTP server binds to
    pub server_address: String,
    /// Pacing delay between starting a round and drawing its roll
    pub roll_delay_ms: u64,
    /// Fixed dice seed, for reproducible sessions. OS entropy when unset.
    pub dice_seed: Option<u64>,
}

impl Conf {
    pub fn new(config_files: Vec<String>) -> Result<Self, anyhow::Error> {
        let mut s = Config::builder().add_source(File::from_str(
            include_str!("../conf_defaults.toml"),
            config::FileFormat::Toml,
        ));
        // Priority order: config file, then environment variables
        for config_file in config_files {
            s = s.add_source(File::with_name(&config_file).required(false));
        }
        let conf: Self = s
            .add_source(
                Environment::with_prefix("dice")
                    .separator("__")
                    .prefix_separator("_")
                    .list_separator(",")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }

    pub fn roll_delay(&self) -> Duration {
        Duration::from_millis(self.roll_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_embedded() {
        let conf = Conf::new(vec![]).unwrap();
        assert_eq!(conf.id, "dice_party");
        assert_eq!(conf.log_format, "full");
        assert_eq!(conf.roll_delay(), Duration::from_secs(1));
        assert_eq!(conf.dice_seed, None);
    }

    #[test]
    fn missing_config_file_is_ignored() {
        let conf = Conf::new(vec!["does/not/exist.toml".to_string()]).unwrap();
        assert_eq!(conf.server_address, "0.0.0.0:8080");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("dice_party_conf_{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "roll_delay_ms = 250\ndice_seed = 99").unwrap();
        drop(file);

        let conf = Conf::new(vec![path.to_string_lossy().into_owned()]).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(conf.roll_delay(), Duration::from_millis(250));
        assert_eq!(conf.dice_seed, Some(99));
        assert_eq!(conf.log_format, "full");
    }
}
