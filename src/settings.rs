use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::CliArgs;
use crate::managers::model::{EngineType, WHISPER_LANGUAGES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenUri {
    /// `host:port`
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for ListenUri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.rsplit_once(':').map_or(true, |(host, port)| {
                host.is_empty() || port.parse::<u16>().is_err()
            }) {
                return Err(format!("expected tcp://HOST:PORT, got '{}'", s));
            }
            Ok(ListenUri::Tcp(addr.to_string()))
        } else if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err("unix:// URI needs a socket path".to_string());
            }
            Ok(ListenUri::Unix(PathBuf::from(path)))
        } else {
            Err(format!("only tcp:// and unix:// URIs are supported, got '{}'", s))
        }
    }
}

impl fmt::Display for ListenUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenUri::Tcp(addr) => write!(f, "tcp://{}", addr),
            ListenUri::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    Int8,
}

/// Layout of log lines written to stderr.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level and message
    #[default]
    Default,
    /// Level and message only, for journald and other collectors that stamp lines
    Plain,
    /// Millisecond timestamp, level, module and message
    Full,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Default => "default",
            LogFormat::Plain => "plain",
            LogFormat::Full => "full",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub model: String,
    pub engine: EngineType,
    pub languages: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Validated startup configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub uri: ListenUri,
    pub english: Option<ModelSettings>,
    pub multilingual: Option<ModelSettings>,
    pub remote: RemoteSettings,
    pub device: Device,
    pub quantization: Option<Quantization>,
    pub initial_prompt: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub close_after_transcript: bool,
}

impl Settings {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let english = non_empty(args.model_en).map(|model| ModelSettings {
            model,
            engine: args.engine_en,
            languages: vec!["en".to_string()],
        });

        let languages: Vec<String> = args
            .multilingual_languages
            .iter()
            .map(|language| language.trim().to_string())
            .filter(|language| !language.is_empty())
            .collect();
        let multilingual = non_empty(args.model_multilingual).map(|model| ModelSettings {
            model,
            engine: args.engine_multilingual,
            languages: if languages.is_empty() {
                WHISPER_LANGUAGES.iter().map(|l| l.to_string()).collect()
            } else {
                languages
            },
        });

        if english.is_none() && multilingual.is_none() {
            warn!("Neither --model-en nor --model-multilingual was given");
        }

        if let Some(temp_dir) = &args.temp_dir {
            if !temp_dir.is_dir() {
                return Err(anyhow!("Temporary directory {:?} does not exist", temp_dir));
            }
        }

        Ok(Self {
            uri: args.uri,
            english,
            multilingual,
            remote: RemoteSettings {
                base_url: args.remote_url,
                api_key: non_empty(args.remote_api_key),
            },
            device: args.device,
            quantization: args.quantization,
            initial_prompt: non_empty(args.initial_prompt),
            temp_dir: args.temp_dir,
            close_after_transcript: args.close_after_transcript,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Settings {
        let cli = CliArgs::try_parse_from(std::iter::once("wyoming-asr").chain(args.iter().copied()))
            .unwrap();
        Settings::from_args(cli).unwrap()
    }

    #[test]
    fn parses_listen_uris() {
        assert_eq!(
            "tcp://0.0.0.0:10300".parse::<ListenUri>().unwrap(),
            ListenUri::Tcp("0.0.0.0:10300".to_string())
        );
        assert_eq!(
            "unix:///run/asr.sock".parse::<ListenUri>().unwrap(),
            ListenUri::Unix(PathBuf::from("/run/asr.sock"))
        );
        assert!("tcp://localhost".parse::<ListenUri>().is_err());
        assert!("tcp://:10300".parse::<ListenUri>().is_err());
        assert!("unix://".parse::<ListenUri>().is_err());
        assert!("http://localhost:80".parse::<ListenUri>().is_err());
        assert_eq!(
            ListenUri::Tcp("127.0.0.1:1".to_string()).to_string(),
            "tcp://127.0.0.1:1"
        );
    }

    #[test]
    fn builds_model_settings_from_flags() {
        let settings = parse(&[
            "--uri",
            "tcp://127.0.0.1:10300",
            "--model-en",
            "/models/parakeet",
            "--engine-en",
            "parakeet",
            "--model-multilingual",
            "whisper-1",
            "--multilingual-languages",
            "nl, fr,de",
            "--quantization",
            "int8",
        ]);

        let english = settings.english.unwrap();
        assert_eq!(english.engine, EngineType::Parakeet);
        assert_eq!(english.languages, vec!["en".to_string()]);

        let multilingual = settings.multilingual.unwrap();
        assert_eq!(multilingual.engine, EngineType::Remote);
        assert_eq!(multilingual.languages, vec!["nl", "fr", "de"]);

        assert_eq!(settings.quantization, Some(Quantization::Int8));
        assert_eq!(settings.device, Device::Cpu);
        assert_eq!(settings.remote.base_url, "http://127.0.0.1:8000/v1");
        assert!(!settings.close_after_transcript);
    }

    #[test]
    fn log_format_is_selectable() {
        let args = |extra: &[&str]| {
            CliArgs::try_parse_from(
                ["wyoming-asr", "--uri", "tcp://127.0.0.1:1"]
                    .into_iter()
                    .chain(extra.iter().copied()),
            )
        };

        assert_eq!(args(&[]).unwrap().log_format, LogFormat::Default);
        assert_eq!(
            args(&["--log-format", "plain"]).unwrap().log_format,
            LogFormat::Plain
        );
        assert_eq!(args(&["--log-format", "full"]).unwrap().log_format, LogFormat::Full);
        assert!(args(&["--log-format", "%(message)s"]).is_err());
    }

    #[test]
    fn defaults_without_models() {
        let settings = parse(&["--uri", "unix:///tmp/asr.sock", "--initial-prompt", "  "]);
        assert!(settings.english.is_none());
        assert!(settings.multilingual.is_none());
        assert!(settings.initial_prompt.is_none());
    }

    #[test]
    fn multilingual_defaults_to_whisper_languages() {
        let settings = parse(&["--uri", "tcp://127.0.0.1:1", "--model-multilingual", "m"]);
        let languages = settings.multilingual.unwrap().languages;
        assert_eq!(languages.len(), WHISPER_LANGUAGES.len());
        assert!(languages.contains(&"nl".to_string()));
    }

    #[test]
    fn rejects_unknown_engine() {
        let result = CliArgs::try_parse_from([
            "wyoming-asr",
            "--uri",
            "tcp://127.0.0.1:1",
            "--engine-en",
            "vosk",
        ]);
        assert!(result.is_err());
    }
}
