use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf};
use thiserror::Error;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Errors that make the process refuse to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value `{value}` for {name}")]
    Invalid { name: &'static str, value: String },
}

/// A credential that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasourceKind {
    Local,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    pub key: Secret,
    pub bucket: String,
    /// Return provider-reported upload failures instead of only logging them.
    pub strict_uploads: bool,
}

/// Which backend to build, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum DatasourceConfig {
    Local(LocalConfig),
    Supabase(SupabaseConfig),
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub datasource: DatasourceConfig,
    /// Bearer token for the `/api` routes. Unset disables them.
    pub api_token: Option<Secret>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Upload storage and raw file server")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_DATASOURCE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_DATASOURCE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Metadata database URL (overrides OBJECT_DATASOURCE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend (overrides OBJECT_DATASOURCE_KIND)
    #[arg(long, value_enum)]
    pub datasource: Option<DatasourceKind>,

    /// Root directory for the local backend (overrides OBJECT_DATASOURCE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Supabase project URL (overrides SUPABASE_URL)
    #[arg(long)]
    pub supabase_url: Option<String>,

    /// Supabase storage bucket (overrides SUPABASE_BUCKET)
    #[arg(long)]
    pub supabase_bucket: Option<String>,

    /// Only log provider-reported upload errors instead of failing the upload
    #[arg(long)]
    pub lenient_uploads: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool), ConfigError> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge parsed arguments with values from `lookup` (the process
    /// environment outside of tests). Arguments win.
    pub fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let port = match args.port {
            Some(port) => port,
            None => match lookup("OBJECT_DATASOURCE_PORT") {
                Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                    name: "OBJECT_DATASOURCE_PORT",
                    value,
                })?,
                None => 3000,
            },
        };

        let kind = match args.datasource {
            Some(kind) => kind,
            None => match lookup("OBJECT_DATASOURCE_KIND") {
                Some(value) => DatasourceKind::from_str(&value, true).map_err(|_| {
                    ConfigError::Invalid {
                        name: "OBJECT_DATASOURCE_KIND",
                        value,
                    }
                })?,
                None => DatasourceKind::Local,
            },
        };

        let datasource = match kind {
            DatasourceKind::Local => DatasourceConfig::Local(LocalConfig {
                root: args
                    .storage_dir
                    .or_else(|| lookup("OBJECT_DATASOURCE_STORAGE_DIR"))
                    .unwrap_or_else(|| "./data/objects".into())
                    .into(),
            }),
            DatasourceKind::Supabase => {
                let url = args
                    .supabase_url
                    .or_else(|| lookup("SUPABASE_URL"))
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid {
                        name: "SUPABASE_URL",
                        value: url,
                    });
                }
                // The key is read from the environment only so it never lands
                // in shell history.
                let key = lookup("SUPABASE_KEY")
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing("SUPABASE_KEY"))?;
                let bucket = args
                    .supabase_bucket
                    .or_else(|| lookup("SUPABASE_BUCKET"))
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing("SUPABASE_BUCKET"))?;
                let strict_uploads = if args.lenient_uploads {
                    false
                } else {
                    match lookup("OBJECT_DATASOURCE_STRICT_UPLOADS") {
                        Some(value) => parse_bool("OBJECT_DATASOURCE_STRICT_UPLOADS", value)?,
                        None => true,
                    }
                };

                DatasourceConfig::Supabase(SupabaseConfig {
                    url: url.trim_end_matches('/').to_string(),
                    key: Secret::new(key),
                    bucket,
                    strict_uploads,
                })
            }
        };

        let max_upload_bytes = match lookup("OBJECT_DATASOURCE_MAX_UPLOAD_BYTES") {
            Some(value) => value.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name: "OBJECT_DATASOURCE_MAX_UPLOAD_BYTES",
                value,
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| lookup("OBJECT_DATASOURCE_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: args
                .database_url
                .or_else(|| lookup("OBJECT_DATASOURCE_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/files.db".into()),
            datasource,
            api_token: lookup("OBJECT_DATASOURCE_API_TOKEN")
                .filter(|v| !v.is_empty())
                .map(Secret::new),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
