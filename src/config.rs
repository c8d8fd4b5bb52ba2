use anyhow::{Context, Result, bail};
use clap::Args;
use std::env;

/// Server configuration, merged from CLI flags, `IVCAP_*` environment
/// variables and defaults (in that order of precedence).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub public_url: String,
}

/// Flags of `ivcap-api serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides IVCAP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IVCAP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where artifact and package payloads are stored (overrides IVCAP_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IVCAP_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// HS256 secret used to verify bearer tokens (overrides IVCAP_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Externally visible base URL used in links (overrides IVCAP_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_opt(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

impl ServerConfig {
    /// Merge `args` with the environment. Returns the config and the migrate flag.
    pub fn from_env_and_args(args: ServeArgs) -> Result<(Self, bool)> {
        let env_port = match env_opt("IVCAP_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing IVCAP_PORT value `{}`", value))?,
            None => 8088,
        };

        let host = match args.host {
            Some(h) => h,
            None => env_opt("IVCAP_HOST")?.unwrap_or_else(|| "0.0.0.0".into()),
        };
        let port = args.port.unwrap_or(env_port);
        let storage_dir = match args.storage_dir {
            Some(d) => d,
            None => env_opt("IVCAP_STORAGE_DIR")?.unwrap_or_else(|| "./data/blobs".into()),
        };
        let database_url = match args.database_url {
            Some(u) => u,
            None => env_opt("IVCAP_DATABASE_URL")?
                .unwrap_or_else(|| "sqlite://./data/meta/ivcap.db".into()),
        };
        let jwt_secret = match args.jwt_secret {
            Some(s) => s,
            None => env_opt("IVCAP_JWT_SECRET")?.unwrap_or_default(),
        };
        if jwt_secret.is_empty() && !args.migrate {
            bail!("a JWT secret is required: pass --jwt-secret or set IVCAP_JWT_SECRET");
        }
        let public_url = match args.public_url {
            Some(u) => u,
            None => env_opt("IVCAP_PUBLIC_URL")?
                .unwrap_or_else(|| format!("http://{}:{}", host, port)),
        };

        let cfg = Self {
            host,
            port,
            storage_dir,
            database_url,
            jwt_secret,
            public_url,
        };
        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection flags shared by every client subcommand.
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Base URL of the API
    #[arg(long, env = "IVCAP_URL", default_value = "http://localhost:8088", global = true)]
    pub url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "IVCAP_JWT", global = true, hide_env_values = true)]
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_take_precedence_and_public_url_follows_bind_address() {
        let (cfg, migrate) = ServerConfig::from_env_and_args(ServeArgs {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            storage_dir: Some("/tmp/blobs".into()),
            database_url: Some("sqlite::memory:".into()),
            jwt_secret: Some("s3cret".into()),
            public_url: None,
            migrate: false,
        })
        .unwrap();
        assert!(!migrate);
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.storage_dir, "/tmp/blobs");
        if std::env::var("IVCAP_PUBLIC_URL").is_err() {
            assert_eq!(cfg.public_url, "http://127.0.0.1:9000");
        }
    }

    #[test]
    fn migrate_does_not_need_a_secret() {
        if std::env::var("IVCAP_JWT_SECRET").is_ok() {
            return;
        }
        let args = ServeArgs {
            migrate: true,
            ..Default::default()
        };
        assert!(ServerConfig::from_env_and_args(args.clone()).unwrap().1);
        let args = ServeArgs {
            migrate: false,
            ..args
        };
        assert!(ServerConfig::from_env_and_args(args).is_err());
    }
}
