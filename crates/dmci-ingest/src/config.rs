//! Configuration management
//!
//! Settings are read from a YAML file whose sections follow the deployed
//! `config.yaml` layout, then overridden from `DMCI__SECTION__KEY`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default maximum accepted payload size in bytes.
pub const DEFAULT_MAX_PERMITTED_SIZE: usize = 100_000;

/// Default timeout for requests to the catalog and search backends.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration file used when neither an argument nor `DMCI_CONFIG` names one.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Environment variable naming the configuration file.
pub const ENV_CONFIG_PATH: &str = "DMCI_CONFIG";

/// Prefix and separator for per-key environment overrides.
pub const ENV_OVERRIDE_PREFIX: &str = "DMCI";
pub const ENV_OVERRIDE_SEPARATOR: &str = "__";

/// DMCI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dmci: DmciConfig,
    pub pycsw: PycswConfig,
    pub customization: CustomizationConfig,
    pub file: FileConfig,
    pub solr: SolrConfig,
    pub http: HttpConfig,
}

/// Core pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmciConfig {
    /// Distributor names, called in this order
    pub distributors: Vec<String>,
    pub distributor_cache: Option<PathBuf>,
    pub rejected_jobs_path: Option<PathBuf>,
    pub max_permitted_size: usize,
    pub mmd_xsd_path: Option<PathBuf>,
    pub path_to_parent_list: Option<PathBuf>,
    pub cf_standard_names_path: Option<PathBuf>,
}

impl Default for DmciConfig {
    fn default() -> Self {
        Self {
            distributors: Vec::new(),
            distributor_cache: None,
            rejected_jobs_path: None,
            max_permitted_size: DEFAULT_MAX_PERMITTED_SIZE,
            mmd_xsd_path: None,
            path_to_parent_list: None,
            cf_standard_names_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PycswConfig {
    pub csw_service_url: Option<String>,
}

/// Deployment customization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizationConfig {
    /// Base URL of the landing pages, e.g. `https://data.met.no/dataset`
    pub catalog_url: Option<String>,
    /// Environment suffix appended to namespaces; unset in production
    pub env_string: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub file_archive_path: Option<PathBuf>,
}

/// Search index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolrConfig {
    pub solr_service_url: Option<String>,
    pub solr_username: Option<String>,
    pub solr_password: Option<String>,
    /// Refuse a child record whose parent is not in the index
    pub missing_parent_fail: bool,
    pub commit_on_delete: bool,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            solr_service_url: None,
            solr_username: None,
            solr_password: None,
            missing_parent_fail: true,
            commit_on_delete: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it
    ///
    /// The file is `path` if given, else `$DMCI_CONFIG`, else `config.yaml`.
    /// A missing file is not an error; validation decides whether the
    /// resulting settings are usable.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .prefix_separator(ENV_OVERRIDE_SEPARATOR)
                    .separator(ENV_OVERRIDE_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("dmci.distributors")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_credential_overrides();
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// `SOLR_USERNAME` / `SOLR_PASSWORD` take precedence over the file
    fn apply_credential_overrides(&mut self) {
        if let Ok(username) = std::env::var("SOLR_USERNAME") {
            self.solr.solr_username = Some(username);
        }
        if let Ok(password) = std::env::var("SOLR_PASSWORD") {
            self.solr.solr_password = Some(password);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        check_dir(self.dmci.distributor_cache.as_deref(), "dmci.distributor_cache")?;
        check_dir(self.dmci.rejected_jobs_path.as_deref(), "dmci.rejected_jobs_path")?;

        if self.dmci.max_permitted_size == 0 {
            anyhow::bail!("dmci.max_permitted_size must be greater than 0");
        }

        for (path, key) in [
            (&self.dmci.mmd_xsd_path, "dmci.mmd_xsd_path"),
            (&self.dmci.path_to_parent_list, "dmci.path_to_parent_list"),
            (&self.dmci.cf_standard_names_path, "dmci.cf_standard_names_path"),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    anyhow::bail!("{} does not exist: {}", key, path.display());
                }
            }
        }

        if self.catalog_url().is_none() {
            anyhow::bail!("customization.catalog_url must be set");
        }

        for name in &self.dmci.distributors {
            match name.as_str() {
                "file" => check_dir(self.file.file_archive_path.as_deref(), "file.file_archive_path")?,
                "pycsw" if self.pycsw.csw_service_url.is_none() => {
                    anyhow::bail!("pycsw.csw_service_url must be set when 'pycsw' is a distributor")
                },
                "solr" if self.solr.solr_service_url.is_none() => {
                    anyhow::bail!("solr.solr_service_url must be set when 'solr' is a distributor")
                },
                "pycsw" | "solr" => {},
                other => tracing::warn!(distributor = %other, "Unknown distributor will be skipped"),
            }
        }

        if self.dmci.distributors.is_empty() {
            tracing::warn!("No distributors configured - jobs will only be validated");
        }

        Ok(())
    }

    /// Environment suffix, treating an empty string as production
    pub fn env_suffix(&self) -> Option<&str> {
        self.customization
            .env_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Landing page base URL without a trailing slash
    pub fn catalog_url(&self) -> Option<&str> {
        self.customization
            .catalog_url
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
    }
}

fn check_dir(path: Option<&Path>, key: &str) -> anyhow::Result<()> {
    match path {
        None => anyhow::bail!("{} must be set", key),
        Some(path) if !path.is_dir() => {
            anyhow::bail!("{} is not a directory: {}", key, path.display())
        },
        Some(_) => Ok(()),
    }
}
