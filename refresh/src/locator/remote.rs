use super::ArtifactLocator;
use crate::{
    artifact::is_image_name,
    ArtifactReference,
    RefreshError,
};
use eyre::{
    bail,
    Context as _,
    OptionExt as _,
    Result,
};
use reqwest::header::CONTENT_DISPOSITION;
use std::{
    future::Future,
    path::{
        Path,
        PathBuf,
    },
    pin::Pin,
    time::Duration,
};
use tokio::{
    fs,
    io::AsyncWriteExt as _,
};
use url::Url;

/// Fixed name of the staged download. Each fetch overwrites it.
pub const STAGING_FILE: &str = "fsimage";
const PARTIAL_FILE: &str = "fsimage.part";

/// Downloads the newest image from the NameNode image servlet into a staging directory.
#[derive(Debug, Clone)]
pub struct RemoteFetchLocator {
    client: reqwest::Client,
    endpoints: Vec<Url>,
    staging_dir: PathBuf,
}

impl RemoteFetchLocator {
    pub fn new(
        endpoints: Vec<Url>,
        staging_dir: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Result<Self, RefreshError> {
        if endpoints.is_empty() {
            return Err(RefreshError::invalid_configuration(
                "at least one namenode URL is required to fetch images remotely",
            ));
        }
        for endpoint in &endpoints {
            if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
                return Err(RefreshError::invalid_configuration(format!(
                    "namenode URL {endpoint} is not an http(s) URL"
                )));
            }
        }

        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir).map_err(|err| {
            RefreshError::invalid_configuration(format!(
                "staging directory {} cannot be used: {err}",
                staging_dir.display()
            ))
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| RefreshError::invalid_configuration(format!("failed to create HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoints,
            staging_dir,
        })
    }

    pub fn staged_path(&self) -> PathBuf {
        self.staging_dir.join(STAGING_FILE)
    }

    async fn fetch(&self) -> Result<ArtifactReference> {
        // Only the first endpoint is asked. A failure waits for the next tick.
        let endpoint = self.endpoints.first().ok_or_eyre("no namenode URL configured")?;
        let url = image_url(endpoint);
        let partial = self.staging_dir.join(PARTIAL_FILE);

        let result = self.download(&url, &partial).await;
        if result.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        let (identity, size_bytes) = result.wrap_err_with(|| format!("Failed to download {url}"))?;

        let staged = self.staged_path();
        fs::rename(&partial, &staged)
            .await
            .wrap_err_with(|| format!("Failed to move download to {}", staged.display()))?;

        let identity = identity.unwrap_or_else(|| {
            debug!("namenode sent no image name, using the staging file name as identity");
            STAGING_FILE.to_string()
        });
        Ok(ArtifactReference::new(identity.as_str(), staged, size_bytes))
    }

    /// Streams the body into `partial`. Returns the image name the server announced and the
    /// number of bytes written.
    async fn download(&self, url: &Url, partial: &Path) -> Result<(Option<String>, u64)> {
        debug!(%url, "downloading fsimage");
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .wrap_err("Request failed")?
            .error_for_status()
            .wrap_err("Namenode rejected the request")?;

        let expected = response.content_length();
        let identity = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(image_name_from_disposition);

        let mut file = fs::File::create(partial)
            .await
            .wrap_err_with(|| format!("Failed to create {}", partial.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.wrap_err("Transfer interrupted")? {
            file.write_all(&chunk).await.wrap_err("Failed to write download")?;
            written += chunk.len() as u64;
        }
        file.sync_all().await.wrap_err("Failed to flush download")?;

        if let Some(expected) = expected {
            if written != expected {
                bail!("Transfer truncated after {written} of {expected} bytes");
            }
        }
        if written == 0 {
            bail!("Namenode returned an empty image");
        }

        info!(%url, bytes = written, image = identity.as_deref(), "downloaded fsimage");
        Ok((identity, written))
    }
}

impl ArtifactLocator for RemoteFetchLocator {
    fn locate_newest(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<ArtifactReference>, RefreshError>> + Send + '_>> {
        Box::pin(async move { self.fetch().await.map(Some).map_err(RefreshError::FetchFailed) })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// `<endpoint>/imagetransfer?getimage=1&txid=latest`
pub fn image_url(endpoint: &Url) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("imagetransfer");
    }
    url.set_query(Some("getimage=1&txid=latest"));
    url
}

/// Extracts `fsimage_<txid>` from a header like `attachment; filename=fsimage_0000000000000000042`.
fn image_name_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .map(|value| value.rsplit(['/', '\\']).next().unwrap_or(value))
        .filter(|name| is_image_name(name))
        .map(str::to_string)
}
