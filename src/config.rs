use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// boardsync collaboration server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "boardsync-server", version, about = "Realtime task/project collaboration server")]
pub struct Config {
    /// Listen port
    #[arg(long, env = "BOARDSYNC_PORT", default_value = "5000")]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "BOARDSYNC_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// TOML config file location
    #[arg(long, default_value = "./boardsync.toml")]
    pub config: String,

    /// Emit JSON log lines instead of pretty output
    #[arg(long, env = "BOARDSYNC_JSON_LOGS")]
    pub json_logs: bool,

    /// Print a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Directory holding the database and signing key
    #[arg(long, env = "BOARDSYNC_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Origin the browser frontend is served from
    #[arg(long, env = "BOARDSYNC_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            config: "./boardsync.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Layered load, lowest precedence first: built-in defaults, the
    /// TOML file, BOARDSYNC_* env vars, CLI flags.
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("BOARDSYNC_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Commented TOML template for `--generate-config`.
pub fn generate_config_template() -> String {
    r#"# boardsync collaboration server configuration
# Place this file at ./boardsync.toml or pass --config <path>.
# Every setting can also be set via environment (BOARDSYNC_PORT, ...)
# or CLI flag (--port, ...).

# Listen port (default: 5000)
# port = 5000

# Listen address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Emit JSON log lines instead of pretty output
# json_logs = false

# Directory holding the SQLite database and JWT signing key
# data_dir = "./data"

# Origin the browser frontend is served from
# cors_origin = "http://localhost:3000"
"#
    .to_string()
}
