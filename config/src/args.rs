use clap::Parser;
use std::{
    net::SocketAddr,
    path::PathBuf,
};

/// Prometheus exporter for HDFS fsimage statistics.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Configuration file to use instead of `config.yaml` in the config directory.
    #[clap(long, short, value_name = "FILE", env = "FSIMAGE_EXPORTER_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Address the metrics endpoint listens on.
    #[clap(long, value_name = "ADDR", env = "FSIMAGE_EXPORTER_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Directory holding `fsimage_<txid>` files in the text format of `hdfs oiv -p Delimited`.
    ///
    /// Raw binary checkpoints as written by the NameNode are not understood. Pointing this at
    /// the NameNode's own image directory makes every refresh fail to parse. Export each
    /// checkpoint with `hdfs oiv -p Delimited -i <image> -o <dir>/fsimage_<txid>` first.
    #[clap(long, value_name = "DIR", env = "FSIMAGE_EXPORTER_FSIMAGE_PATH")]
    pub fs_image_path: Option<PathBuf>,

    /// Download the newest fsimage from a NameNode instead of watching a local directory.
    ///
    /// The NameNode serves raw binary images, which the bundled analyzer cannot parse, so this
    /// mode needs an analyzer for the binary format.
    #[clap(long = "remote", action)]
    pub fetch_from_remote_namenode: bool,

    /// NameNode HTTP address to download images from. May be repeated.
    #[clap(
        long = "namenode-url",
        value_name = "URL",
        env = "FSIMAGE_EXPORTER_NAMENODE_URLS",
        value_delimiter = ','
    )]
    pub namenode_urls: Vec<String>,

    /// Kerberos principal used against the NameNode.
    #[clap(long, value_name = "PRINCIPAL", env = "FSIMAGE_EXPORTER_PRINCIPAL")]
    pub principal: Option<String>,

    /// Keytab holding the key for `--principal`.
    #[clap(long, value_name = "FILE", env = "FSIMAGE_EXPORTER_KEYTAB")]
    pub keytab_path: Option<PathBuf>,

    /// How often to look for a new fsimage, e.g. "60s" or "5m".
    #[clap(long, value_name = "DURATION")]
    pub refresh_interval: Option<String>,

    /// Enables debug logging.
    #[clap(long = "verbose", short, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(listen_address) = &self.listen_address {
                cache.insert("listen_address".to_string(), listen_address.to_string().into());
            }
            if let Some(fs_image_path) = &self.fs_image_path {
                cache.insert(
                    "fs_image_path".to_string(),
                    fs_image_path.to_string_lossy().to_string().into(),
                );
            }
            if self.fetch_from_remote_namenode {
                cache.insert("fetch_from_remote_namenode".to_string(), true.into());
            }
            if !self.namenode_urls.is_empty() {
                cache.insert("namenode_urls".to_string(), self.namenode_urls.clone().into());
            }
            if let Some(principal) = &self.principal {
                cache.insert("principal".to_string(), principal.clone().into());
            }
            if let Some(keytab_path) = &self.keytab_path {
                cache.insert(
                    "keytab_path".to_string(),
                    keytab_path.to_string_lossy().to_string().into(),
                );
            }
            if let Some(refresh_interval) = &self.refresh_interval {
                cache.insert("refresh_interval".to_string(), refresh_interval.clone().into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let config_dir_path = crate::get_config_dir().display().to_string();
    let cache_dir_path = crate::get_cache_dir().display().to_string();

    format!(
        "{}

Config directory: {config_dir_path}
Cache directory: {cache_dir_path}",
        clap::crate_version!()
    )
}
