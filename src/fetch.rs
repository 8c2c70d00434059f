//! Source archive download from GitHub releases.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::archive::SourceArchive;
use crate::config::Config;
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("docbook-xtm/", env!("CARGO_PKG_VERSION"));

/// Page size of release listings (the GitHub maximum).
const RELEASES_PER_PAGE: usize = 100;

/// Minimal blocking HTTP access, so the fetcher can be tested offline.
pub trait HttpClient {
    /// GET `url` with extra request headers and return the body.
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(300)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .map_err(|e| Error::Fetch(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!("HTTP {} from {url}", response.status())));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::Fetch(format!("failed to read response from {url}: {e}")))
    }
}

/// The fields of a GitHub release this crate uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub target_commitish: String,
    /// ISO 8601 timestamp; lexical order is chronological.
    #[serde(default)]
    pub published_at: Option<String>,
    pub zipball_url: String,
}

impl Release {
    /// Version field of a release tag: the fourth dash-separated field from
    /// the end (`RH124-RHEL9.0-en-1-20220609` has `RHEL9.0`).
    pub fn version(&self) -> Option<&str> {
        self.tag_name.rsplit('-').nth(3)
    }

    fn matches(&self, tag: &str) -> bool {
        self.tag_name.contains(tag) || self.target_commitish.contains(tag)
    }
}

/// Choose the release to download.
///
/// With a tag, only releases whose tag name or target commitish contains it
/// are considered. The most recently published candidate wins. Without a
/// tag, that release is compared with the repository's `latest` release: the
/// one with the higher version field wins, or the more recently published one
/// when both versions are equal.
pub fn select_release<'a>(
    releases: &'a [Release],
    tag: Option<&str>,
    latest: Option<&'a Release>,
) -> Option<&'a Release> {
    let mut newest: Option<&Release> = None;
    for release in releases.iter().filter(|r| tag.is_none_or(|t| r.matches(t))) {
        if newest.is_none_or(|n| release.published_at > n.published_at) {
            newest = Some(release);
        }
    }
    let newest = newest?;

    let Some(latest) = latest.filter(|l| tag.is_none() && *l != newest) else {
        return Some(newest);
    };
    let later = if latest.version() != newest.version() {
        latest.version() > newest.version()
    } else {
        latest.published_at > newest.published_at
    };
    Some(if later { latest } else { newest })
}

/// Downloads course source archives.
pub struct GithubFetcher<C: HttpClient> {
    client: C,
    config: Config,
}

impl<C: HttpClient> GithubFetcher<C> {
    pub fn new(client: C, config: Config) -> Self {
        Self { client, config }
    }

    /// Download the release of `course` matching `tag` into `dest_dir`.
    ///
    /// The zipball's top-level directory is renamed to `<course>-<tag name>`
    /// and the archive saved as `<course>-<tag name>.zip`.
    pub fn fetch(&self, course: &str, tag: Option<&str>, dest_dir: &Path) -> Result<PathBuf> {
        let repo = format!("{}/repos/{}/{course}", self.config.api_base, self.config.owner);

        let releases = self.list_releases(&repo)?;
        let latest: Option<Release> = match tag {
            Some(_) => None,
            None => self
                .get_json(&format!("{repo}/releases/latest"))
                .inspect_err(|e| debug!("no latest release for {course}: {e}"))
                .ok(),
        };

        let release = select_release(&releases, tag, latest.as_ref()).ok_or_else(|| {
            Error::Fetch(match tag {
                Some(tag) => format!("no release of {course} matches '{tag}'"),
                None => format!("{course} has no releases"),
            })
        })?;
        info!("downloading {course} release {}", release.tag_name);

        let zipball = self.get(&release.zipball_url)?;
        let root = format!("{course}-{}", release.tag_name);
        let dest = dest_dir.join(format!("{root}.zip"));

        let mut archive =
            SourceArchive::from_reader(Cursor::new(zipball), release.zipball_url.clone())?;
        archive.reroot(&root, File::create(&dest)?)?;
        debug!("saved {}", dest.display());
        Ok(dest)
    }

    /// Every release of the repository, following the listing's pages until a
    /// short one comes back.
    fn list_releases(&self, repo: &str) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for page in 1.. {
            let url = format!("{repo}/releases?per_page={RELEASES_PER_PAGE}&page={page}");
            let batch: Vec<Release> = self.get_json(&url)?;
            let done = batch.len() < RELEASES_PER_PAGE;
            releases.extend(batch);
            if done {
                break;
            }
        }
        debug!("{repo} has {} releases", releases.len());
        Ok(releases)
    }

    fn headers(&self) -> Vec<(&str, String)> {
        let mut headers = vec![("Accept", "application/vnd.github+json".to_string())];
        if let Some(token) = &self.config.token {
            headers.push(("Authorization", format!("token {token}")));
        }
        headers
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let headers = self.headers();
        let headers: Vec<(&str, &str)> =
            headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.client.get(url, &headers)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get(url)?;
        Ok(serde_json::from_slice(&body)?)
    }
}
