//! Library errors

use miette::Diagnostic;
use thiserror::Error;

/// All possible errors returned by flashpack
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("The firmware archive contains no binary images")]
    #[diagnostic(
        code(flashpack::empty_image_set),
        help("Make sure the zip contains at least one `.bin` file")
    )]
    EmptyImageSet,

    #[error("No application image found in the archive")]
    #[diagnostic(
        code(flashpack::no_app_image),
        help("The archive must contain a file whose name includes `firmware` or `app`")
    )]
    NoAppImage,

    #[error("Flash regions of '{first}' and '{second}' overlap")]
    #[diagnostic(
        code(flashpack::overlapping_regions),
        help("Adjust the custom offsets so that no two images share a flash range")
    )]
    OverlappingRegions { first: String, second: String },

    #[error("Invalid custom offset '{0}'")]
    #[diagnostic(
        code(flashpack::invalid_offset),
        help("Offsets must be hexadecimal with a `0x` prefix, e.g. `0x10000`")
    )]
    InvalidOffset(String),

    #[error("Failed to read archive entry '{0}'")]
    #[diagnostic(code(flashpack::archive_read))]
    ArchiveRead(String, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("The archive could not be parsed")]
    #[diagnostic(
        code(flashpack::archive_invalid),
        help("The downloaded file does not look like a valid zip archive")
    )]
    ArchiveInvalid(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("No serial port was selected")]
    #[diagnostic(
        code(flashpack::no_port_selected),
        help("Pick a serial port from the chooser to connect to the device")
    )]
    NoPortSelected,

    #[error("Permission to access the serial port was denied")]
    #[diagnostic(
        code(flashpack::port_permission_denied),
        help("Grant serial port access and try connecting again")
    )]
    PortPermissionDenied,

    #[error("Error while connecting to device")]
    #[diagnostic(
        code(flashpack::connection_failed),
        help("Ensure the device is attached and not held in reset, then try again")
    )]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("A flashing session is not active")]
    #[diagnostic(
        code(flashpack::not_connected),
        help("Connect to a device before executing a write plan")
    )]
    NotConnected,

    #[error("Failed to flash '{filename}'")]
    #[diagnostic(
        code(flashpack::flash_write),
        help("Flashing was aborted; the device may be left in a non-booting state \
              until a complete flash succeeds")
    )]
    FlashWrite {
        filename: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Repository {owner}/{repo} was not found")]
    #[diagnostic(
        code(flashpack::repository_not_found),
        help("Check the owner and repository names for typos")
    )]
    RepositoryNotFound { owner: String, repo: String },

    #[error("GitHub API rate limit exceeded")]
    #[diagnostic(
        code(flashpack::rate_limited),
        help("Unauthenticated requests are limited to 60 per hour; wait and try again")
    )]
    RateLimited,

    #[error("Request failed with HTTP status {0}")]
    #[diagnostic(code(flashpack::http_status))]
    Http(u16),

    #[error("Network error while fetching release data")]
    #[diagnostic(code(flashpack::network))]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Classify an HTTP status from the release fetcher.
    ///
    /// GitHub reports rate limiting on unauthenticated requests as 403, so
    /// that status is surfaced as [Error::RateLimited] rather than a generic
    /// HTTP failure, and 404 as [Error::RepositoryNotFound].
    pub fn from_http_status(status: u16, owner: &str, repo: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            404 => Some(Error::RepositoryNotFound {
                owner: owner.into(),
                repo: repo.into(),
            }),
            403 => Some(Error::RateLimited),
            status => Some(Error::Http(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_classification() {
        assert!(Error::from_http_status(200, "o", "r").is_none());
        assert!(matches!(
            Error::from_http_status(404, "o", "r"),
            Some(Error::RepositoryNotFound { .. })
        ));
        assert!(matches!(
            Error::from_http_status(403, "o", "r"),
            Some(Error::RateLimited)
        ));
        assert!(matches!(
            Error::from_http_status(500, "o", "r"),
            Some(Error::Http(500))
        ));
    }
}
