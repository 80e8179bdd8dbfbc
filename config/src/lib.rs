#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod iec;

pub use app_config::{
    get_cache_dir,
    get_config_dir,
};
pub use args::Args;
use eyre::{
    bail,
    eyre,
    Context as _,
    Result,
};
pub use iec::parse_iec_size;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub listen_address: SocketAddr,
    /// Directory holding `fsimage_<txid>` exports in `hdfs oiv -p Delimited` format. Unused in
    /// remote mode.
    #[serde(default)]
    pub fs_image_path: PathBuf,
    #[serde(default)]
    pub fetch_from_remote_namenode: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namenode_urls: Vec<url::Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keytab_path: Option<PathBuf>,
    /// Where downloaded images are staged. Defaults to a folder in the cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    #[serde(default = "default_refresh_interval", with = "duration_str")]
    pub refresh_interval: Duration,
    #[serde(default, with = "optional_duration_str", skip_serializing_if = "Option::is_none")]
    pub fetch_timeout: Option<Duration>,
    /// Paths to report statistics for. A trailing regex segment such as `/user/ab.*`
    /// selects the matching direct child directories.
    #[serde(default)]
    pub paths: BTreeSet<String>,
    /// Named groups of paths whose statistics are reported together.
    #[serde(default)]
    pub path_sets: BTreeMap<String, Vec<String>>,
    pub file_size_distribution_buckets: Vec<String>,
    #[serde(default)]
    pub skip_file_distribution_for_user_stats: bool,
    #[serde(default)]
    pub skip_file_distribution_for_group_stats: bool,
    #[serde(default)]
    pub skip_file_distribution_for_path_stats: bool,
    #[serde(default)]
    pub skip_file_distribution_for_path_set_stats: bool,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers the embedded defaults, the config file and the command line, in that order.
    pub fn new(args: &Args) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Yaml,
        ));

        builder = match &args.config {
            Some(path) => builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Yaml)
                    .required(true),
            ),
            None => builder.add_source(
                config::File::from(get_config_dir().join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder.add_source(args.clone());

        let cfg: Self = builder.build()?.try_deserialize()?;
        debug!(?cfg, "loaded configuration");

        Ok(cfg)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml))
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        Ok(cfg)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| get_cache_dir().join("images"))
    }

    /// Upper bounds of the file size distribution in bytes, ascending.
    pub fn file_size_distribution_bounds(&self) -> Result<Vec<u64>> {
        let bounds = self
            .file_size_distribution_buckets
            .iter()
            .map(|bucket| parse_iec_size(bucket))
            .collect::<Result<Vec<_>>>()
            .wrap_err("Invalid file_size_distribution_buckets")?;

        if bounds.is_empty() {
            bail!("file_size_distribution_buckets must not be empty");
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            bail!(
                "file_size_distribution_buckets must be strictly ascending, but {} is followed by {}",
                pair[0],
                pair[1]
            );
        }
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_from_remote_namenode {
            if self.namenode_urls.is_empty() {
                bail!("fetch_from_remote_namenode is set but no namenode_urls are configured");
            }
            match (&self.principal, &self.keytab_path) {
                (Some(_), Some(_)) | (None, None) => {}
                _ => bail!("principal and keytab_path must be configured together"),
            }
        } else if self.fs_image_path.as_os_str().is_empty() {
            bail!("fs_image_path must point to the directory holding fsimage files");
        }

        if self.refresh_interval.is_zero() {
            return Err(eyre!("refresh_interval must be greater than zero"));
        }

        for (name, paths) in &self.path_sets {
            if paths.is_empty() {
                bail!("path set {name:?} has no paths");
            }
        }

        self.file_size_distribution_bounds()?;
        Ok(())
    }
}

mod duration_str {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub(super) fn parse(value: &str) -> Result<Duration, String> {
        let value = value.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Ok(Duration::from_secs(secs));
        }
        humantime::parse_duration(value).map_err(|e| format!("invalid duration {value:?}: {e}"))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse(&value).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_str {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::duration_str::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|value| super::duration_str::parse(&value))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
