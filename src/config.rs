//! Server configuration: listen address, preset channels and bots, bot
//! parameter ranges, and the word bank bots draw chatter from.
//!
//! Loaded once at startup from a YAML file; nothing here is mutated
//! afterwards.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

impl IntRange {
    pub fn sample(&self, rng: &mut impl rand::Rng) -> u32 {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    pub fn sample(&self, rng: &mut impl rand::Rng) -> f64 {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..self.max)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotRanges {
    pub channels_target: IntRange,
    pub channels_leave_rate: FloatRange,
    pub message_rate: FloatRange,
    pub message_length: IntRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotPreset {
    pub nickname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `"<host>:<port>"`, IPv4.
    pub listen: String,

    /// Server hostname used as the prefix on server-originated lines.
    /// Defaults to the host portion of `listen` when absent.
    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default)]
    pub bots: Vec<BotPreset>,

    pub bot_ranges: BotRanges,

    #[serde(default)]
    pub word_bank: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
    }

    pub fn hostname(&self) -> &str {
        match &self.hostname {
            Some(h) => h,
            None => self.listen.split(':').next().unwrap_or("irczt"),
        }
    }

    /// A small configuration usable from tests without touching the
    /// filesystem.
    #[cfg(test)]
    pub fn sample() -> Config {
        Config {
            listen: "127.0.0.1:6667".to_owned(),
            hostname: Some("irczt.test".to_owned()),
            channels: vec!["#lobby".to_owned()],
            bots: Vec::new(),
            bot_ranges: BotRanges {
                channels_target: IntRange { min: 1, max: 3 },
                channels_leave_rate: FloatRange { min: 0.0, max: 0.1 },
                message_rate: FloatRange { min: 0.0, max: 0.2 },
                message_length: IntRange { min: 3, max: 8 },
            },
            word_bank: vec!["hello".to_owned(), "world".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_defaults_to_listen_host() {
        let mut cfg = Config::sample();
        cfg.hostname = None;
        cfg.listen = "0.0.0.0:6667".to_owned();
        assert_eq!(cfg.hostname(), "0.0.0.0");
    }

    #[test]
    fn hostname_override_wins() {
        let cfg = Config::sample();
        assert_eq!(cfg.hostname(), "irczt.test");
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
listen: "0.0.0.0:6667"
channels: ["#lobby", "#general"]
bots:
  - nickname: chatbot
bot_ranges:
  channels_target: { min: 1, max: 2 }
  channels_leave_rate: { min: 0.0, max: 0.05 }
  message_rate: { min: 0.0, max: 0.1 }
  message_length: { min: 2, max: 6 }
word_bank: ["lorem", "ipsum"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.channels, vec!["#lobby", "#general"]);
        assert_eq!(cfg.bots.len(), 1);
        assert_eq!(cfg.bots[0].nickname, "chatbot");
    }

    #[test]
    fn load_reads_and_parses_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irczt.yaml");
        std::fs::write(
            &path,
            r#"
listen: "0.0.0.0:6667"
channels: ["#lobby"]
bot_ranges:
  channels_target: { min: 1, max: 1 }
  channels_leave_rate: { min: 0.0, max: 0.0 }
  message_rate: { min: 0.0, max: 0.0 }
  message_length: { min: 1, max: 1 }
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:6667");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/irczt.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_, _)));
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irczt.yaml");
        std::fs::write(&path, "not: [valid, irczt, config").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_, _)));
    }
}
