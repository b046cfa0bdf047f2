use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Non-admins may mute for at most this many seconds under the permissive policy.
pub(crate) const DEFAULT_MAX_UNAUTHORIZED_MUTE_SECS: i64 = 3 * 60;

#[derive(Parser, Debug)]
#[command(name = "groupwarden", about = "Group moderation tools for OneBot v11 bots")]
pub(crate) struct Args {
    /// OneBot v11 event WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:3001", env = "GROUPWARDEN_WS_URL")]
    pub(crate) ws_url: String,

    /// OneBot v11 HTTP action API base URL
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "GROUPWARDEN_API_URL")]
    pub(crate) api_url: String,

    /// Access token for the OneBot endpoints
    #[arg(long, env = "GROUPWARDEN_ACCESS_TOKEN")]
    pub(crate) access_token: Option<String>,

    /// Directory holding the blacklist database
    #[arg(long, env = "GROUPWARDEN_DATA_DIR")]
    pub(crate) data_dir: Option<PathBuf>,

    /// Comma-separated bot admin ids
    #[arg(long, env = "GROUPWARDEN_ADMINS")]
    pub(crate) admins: Option<String>,

    /// Longest mute (seconds) a non-admin may request under the permissive policy
    #[arg(long, env = "GROUPWARDEN_MAX_UNAUTHORIZED_MUTE_SECS")]
    pub(crate) max_unauthorized_mute_secs: Option<i64>,

    /// How mute requests from non-admins are handled
    #[arg(long, value_enum, env = "GROUPWARDEN_MUTE_POLICY")]
    pub(crate) mute_policy: Option<MutePolicy>,

    /// Plugin config file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(long, env = "GROUPWARDEN_CONFIG")]
    pub(crate) config: Option<String>,

    /// Print the tool declarations as JSON and exit
    #[arg(long)]
    pub(crate) print_tools: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MutePolicy {
    /// Non-admins may mute, but only up to the configured maximum.
    #[default]
    Permissive,
    /// Only admins may mute.
    Strict,
}

/// Plugin config file contents. `max_unauthorized_ban_duration` is the
/// file-side name for `--max-unauthorized-mute-secs`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PluginConfigFile {
    pub(crate) max_unauthorized_ban_duration: Option<i64>,
    pub(crate) mute_policy: Option<MutePolicy>,
    pub(crate) admins: Vec<String>,
}

/// Immutable configuration resolved once at startup.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) ws_url: String,
    pub(crate) api_url: String,
    pub(crate) access_token: Option<String>,
    pub(crate) data_dir: PathBuf,
    pub(crate) admins: Vec<String>,
    pub(crate) max_unauthorized_mute_secs: i64,
    pub(crate) mute_policy: MutePolicy,
}

impl Config {
    /// Precedence: CLI/env > config file > defaults.
    pub(crate) fn from_args(args: &Args) -> Result<Self, AppError> {
        let file = match args.config {
            Some(ref path) => load_config_file(path)?,
            None => PluginConfigFile::default(),
        };

        let max_unauthorized_mute_secs = args
            .max_unauthorized_mute_secs
            .or(file.max_unauthorized_ban_duration)
            .unwrap_or(DEFAULT_MAX_UNAUTHORIZED_MUTE_SECS);
        if max_unauthorized_mute_secs < 0 {
            return Err(AppError::Config(format!(
                "max unauthorized mute duration must not be negative, got {max_unauthorized_mute_secs}"
            )));
        }

        let mut admins = file.admins;
        if let Some(ref list) = args.admins {
            admins.extend(parse_admin_list(list));
        }
        admins.retain(|a| !a.trim().is_empty());
        admins.sort();
        admins.dedup();

        Ok(Config {
            ws_url: args.ws_url.clone(),
            api_url: args.api_url.clone(),
            access_token: args.access_token.clone().filter(|t| !t.is_empty()),
            data_dir: args.data_dir.clone().unwrap_or_else(default_data_dir),
            admins,
            max_unauthorized_mute_secs,
            mute_policy: args.mute_policy.or(file.mute_policy).unwrap_or_default(),
        })
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("groupwarden")
}

fn parse_admin_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

pub(crate) fn load_config_file(path: &str) -> Result<PluginConfigFile, AppError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read config file {path}: {e}")))?;
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {path}: {e}")))
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {path}: {e}")))
    }
}
