// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Root of the catalog tree: `<dir>/<game>/<locale>/<kind>.json`.
    pub catalog_dir: PathBuf,
    /// Locale used when a request does not name one.
    pub default_locale: String,
    /// How long a loaded locale catalog is served before reloading.
    pub catalog_refresh: Duration,
    /// Minimum time between two profile syncs of the same player.
    pub sync_cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:buildboard.db?mode=rwc".to_string(),
            port: 3000,
            catalog_dir: PathBuf::from("data/catalog"),
            default_locale: "en".to_string(),
            catalog_refresh: Duration::from_secs(3600),
            sync_cooldown: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:buildboard.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `CATALOG_DIR` - Catalog root directory (default: `data/catalog`)
    /// - `DEFAULT_LOCALE` - Fallback locale (default: `en`)
    /// - `CATALOG_REFRESH_SECS` - Catalog cache lifetime (default: 3600)
    /// - `SYNC_COOLDOWN_SECS` - Per-player profile sync cooldown (default: 60)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let database_url = env("DATABASE_URL").unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.port);

        let catalog_dir = env("CATALOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.catalog_dir);

        let default_locale = env("DEFAULT_LOCALE")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_locale);

        let secs = |key: &str, fallback: Duration| {
            env(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Config {
            database_url,
            port,
            catalog_dir,
            default_locale,
            catalog_refresh: secs("CATALOG_REFRESH_SECS", defaults.catalog_refresh),
            sync_cooldown: secs("SYNC_COOLDOWN_SECS", defaults.sync_cooldown),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = load(&["bin"], &[]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.default_locale, "en");
        assert_eq!(c.catalog_dir, PathBuf::from("data/catalog"));
        assert_eq!(c.sync_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_cli_port_beats_env() {
        let c = load(&["bin", "--port", "8080"], &[("PORT", "9000")]);
        assert_eq!(c.port, 8080);
        let c = load(&["bin"], &[("PORT", "9000")]);
        assert_eq!(c.port, 9000);
        let c = load(&["bin"], &[("PORT", "nope")]);
        assert_eq!(c.port, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let c = load(
            &["bin"],
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("CATALOG_DIR", "/srv/catalog"),
                ("DEFAULT_LOCALE", "ja"),
                ("CATALOG_REFRESH_SECS", "5"),
                ("SYNC_COOLDOWN_SECS", "0"),
            ],
        );
        assert_eq!(c.database_url, "sqlite::memory:");
        assert_eq!(c.catalog_dir, PathBuf::from("/srv/catalog"));
        assert_eq!(c.default_locale, "ja");
        assert_eq!(c.catalog_refresh, Duration::from_secs(5));
        assert_eq!(c.sync_cooldown, Duration::ZERO);
    }
}
