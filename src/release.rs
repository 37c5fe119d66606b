//! Firmware discovery via GitHub releases
//!
//! The HTTP client lives behind [ReleaseFetcher]; this module only defines
//! the wire types and the asset-selection convention. Status classification
//! for fetcher implementations is [crate::Error::from_http_status], which
//! keeps the rate-limit (403) and not-found (404) cases distinguishable for
//! the presentation layer.

use serde::Deserialize;

use crate::error::Error;
use crate::progress::ProgressCallbacks;

/// Extension of downloadable firmware bundles among release assets.
const ARCHIVE_EXTENSION: &str = ".zip";

/// A published release, field names per the GitHub REST API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<String>,
}

/// A downloadable artifact attached to a [Release].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Release discovery and download, implemented by the embedding platform.
///
/// Unauthenticated GitHub requests are rate-limited to 60 per hour;
/// implementations should map HTTP statuses through
/// [Error::from_http_status] so 403 surfaces as [Error::RateLimited].
pub trait ReleaseFetcher {
    /// List the releases of `owner/repo`, newest first.
    fn list_releases(&mut self, owner: &str, repo: &str) -> Result<Vec<Release>, Error>;

    /// List the assets attached to one release.
    fn list_assets(
        &mut self,
        owner: &str,
        repo: &str,
        release_id: u64,
    ) -> Result<Vec<Asset>, Error>;

    /// Download an asset, reporting byte progress.
    fn download(
        &mut self,
        url: &str,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<Vec<u8>, Error>;
}

/// Pick the firmware archive among a release's assets.
///
/// Convention: the first asset named `*.zip` is the firmware bundle.
pub fn firmware_asset(assets: &[Asset]) -> Option<&Asset> {
    assets
        .iter()
        .find(|asset| asset.name.to_lowercase().ends_with(ARCHIVE_EXTENSION))
}
