/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/websocket";

/// Identity of the signed-in user, supplied by the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST backend (without trailing slash)
    pub api_url: String,

    /// Broker WebSocket endpoint
    pub ws_url: String,

    /// Bearer credential attached to REST calls and the broker handshake
    pub token: String,

    /// Signed-in user
    pub user: CurrentUser,

    /// History page size
    pub page_size: u32,

    /// Inactivity window after which a local "stop typing" is published
    pub typing_debounce: Duration,

    /// Optional expiry for remote typing indicators (disabled by default)
    pub typing_ttl: Option<Duration>,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Broker handshake timeout
    pub connection_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            token: String::new(),
            user: CurrentUser {
                user_id: 0,
                name: String::new(),
                email: String::new(),
            },
            page_size: 50,
            typing_debounce: Duration::from_millis(1000),
            typing_ttl: None,
            request_timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Config::default();
        let mut user_id: Option<i64> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--token" => {
                    config.token = flag_value(args, i, "--token")?.to_string();
                    i += 2;
                }
                "--user-id" => {
                    let v = flag_value(args, i, "--user-id")?;
                    user_id = Some(v.parse::<i64>().map_err(|_| {
                        ChatError::Config("--user-id must be a number".to_string())
                    })?);
                    i += 2;
                }
                "--user-name" => {
                    config.user.name = flag_value(args, i, "--user-name")?.to_string();
                    i += 2;
                }
                "--user-email" => {
                    config.user.email = flag_value(args, i, "--user-email")?.to_string();
                    i += 2;
                }
                "--ws-url" => {
                    config.ws_url = flag_value(args, i, "--ws-url")?.to_string();
                    i += 2;
                }
                "--page-size" => {
                    config.page_size = parse_number(args, i, "--page-size")?;
                    if config.page_size == 0 {
                        return Err(ChatError::Config("--page-size must be positive".to_string()));
                    }
                    i += 2;
                }
                "--typing-debounce-ms" => {
                    config.typing_debounce =
                        Duration::from_millis(parse_number(args, i, "--typing-debounce-ms")?);
                    i += 2;
                }
                "--typing-ttl-ms" => {
                    let ms: u64 = parse_number(args, i, "--typing-ttl-ms")?;
                    config.typing_ttl = (ms > 0).then(|| Duration::from_millis(ms));
                    i += 2;
                }
                "--timeout-ms" => {
                    config.request_timeout =
                        Duration::from_millis(parse_number(args, i, "--timeout-ms")?);
                    i += 2;
                }
                other if other.starts_with("--") => {
                    return Err(ChatError::Config(format!("Unknown flag: {}", other)));
                }
                other => {
                    config.api_url = other.trim_end_matches('/').to_string();
                    i += 1;
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(token) = std::env::var("CHATLINK_TOKEN") {
            config.token = token;
        }
        if let Ok(url) = std::env::var("CHATLINK_WS_URL") {
            config.ws_url = url;
        }
        if let Ok(url) = std::env::var("CHATLINK_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        config.user.user_id = user_id.ok_or_else(|| {
            ChatError::Config(format!(
                "Usage: {} [api_url] --user-id <id> --user-name <name> [--token <jwt>] [--ws-url <url>] [--page-size <n>] [--typing-debounce-ms <ms>] [--typing-ttl-ms <ms>] [--timeout-ms <ms>]",
                args.first().map(|s| s.as_str()).unwrap_or("chatlink")
            ))
        })?;
        if config.user.name.is_empty() {
            return Err(ChatError::Config("--user-name is required".to_string()));
        }

        Ok(config)
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| ChatError::Config(format!("{} requires an argument", flag)))
}

fn parse_number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T> {
    flag_value(args, i, flag)?
        .parse::<T>()
        .map_err(|_| ChatError::Config(format!("{} must be a valid number", flag)))
}
