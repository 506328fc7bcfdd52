use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::{StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;

use crate::error::ApiError;
use crate::traits::{ArchiveStream, LauncherApi};
use crate::types::{LatestVersionResponse, LauncherInfo, Version};

const LATEST_PATH: &str = "/api/LauncherVersions/Latest";
const DOWNLOAD_PATH: &str = "/api/LauncherVersions/Download";
const UPDATE_VERSION_PATH: &str = "/api/LauncherVersions/UpdateVersion";
const AUTH_SCHEME: &str = "ArcadeMachine";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub user: String,
    pub password: String,
}

impl ApiCredentials {
    fn header_value(&self) -> Result<HeaderValue, ApiError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.user, self.password));
        let mut value = HeaderValue::from_str(&format!("{AUTH_SCHEME} {encoded}"))
            .map_err(|_| ApiError::InvalidCredentials)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVersionRequest {
    version_number: String,
}

/// HTTP client for the launcher-versions endpoints of the fleet service.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Url,
    authorization: HeaderValue,
    request_timeout: Duration,
}

impl HttpApiClient {
    /// Build a client for the service at `base_url`.
    ///
    /// `request_timeout` bounds the small JSON calls; archive downloads are
    /// only bounded per read so large archives on slow links still complete.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL, the credentials
    /// cannot be encoded as a header, or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        credentials: &ApiCredentials,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|error| ApiError::InvalidUrl {
            url: base_url.to_string(),
            details: error.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(request_timeout)
            .user_agent(format!("arcade-updater/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            authorization: credentials.header_value()?,
            request_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|error| ApiError::InvalidUrl {
            url: format!("{}{path}", self.base_url),
            details: error.to_string(),
        })
    }

    fn download_url(&self, info: &LauncherInfo) -> Result<(Url, bool), ApiError> {
        if info.archive_url.is_empty() {
            let mut url = self.endpoint(DOWNLOAD_PATH)?;
            url.query_pairs_mut()
                .append_pair("versionNumber", &info.version.to_string());
            return Ok((url, true));
        }

        let url = Url::parse(&info.archive_url).map_err(|error| ApiError::InvalidUrl {
            url: info.archive_url.clone(),
            details: error.to_string(),
        })?;
        Ok((url, false))
    }
}

async fn status_error(operation: &'static str, response: reqwest::Response) -> ApiError {
    let status = response.status();
    let body_snippet = response
        .text()
        .await
        .ok()
        .map(|body| response_snippet(&body, 160))
        .unwrap_or_default();

    if matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) {
        warn!("{operation} rejected with {status}{body_snippet}");
    } else {
        error!("Unexpected {status} from {operation}");
    }

    ApiError::HttpStatus {
        operation,
        status,
        body_snippet,
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.trim().chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[async_trait]
impl LauncherApi for HttpApiClient {
    async fn latest_launcher(&self) -> Result<LauncherInfo, ApiError> {
        const OPERATION: &str = "latest launcher version";

        let response = self
            .http
            .get(self.endpoint(LATEST_PATH)?)
            .header(AUTHORIZATION, self.authorization.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|error| ApiError::request(OPERATION, error))?;

        if !response.status().is_success() {
            return Err(status_error(OPERATION, response).await);
        }

        let latest: LatestVersionResponse = response
            .json()
            .await
            .map_err(|error| ApiError::parse(OPERATION, error))?;
        let info = LauncherInfo::try_from(latest)?;
        debug!("Latest launcher is {} ({})", info.version, info.archive_url);
        Ok(info)
    }

    async fn download_archive(&self, info: &LauncherInfo) -> Result<ArchiveStream, ApiError> {
        const OPERATION: &str = "launcher archive download";

        let (url, authenticated) = self.download_url(info)?;
        info!("Downloading launcher {} from {url}", info.version);

        let mut request = self.http.get(url);
        if authenticated {
            request = request.header(AUTHORIZATION, self.authorization.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|error| ApiError::request(OPERATION, error))?;

        if !response.status().is_success() {
            return Err(status_error(OPERATION, response).await);
        }

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|error| ApiError::request(OPERATION, error))
            .boxed())
    }

    async fn report_installed_version(&self, version: Version) -> Result<(), ApiError> {
        const OPERATION: &str = "installed version report";

        let response = self
            .http
            .put(self.endpoint(UPDATE_VERSION_PATH)?)
            .header(AUTHORIZATION, self.authorization.clone())
            .timeout(self.request_timeout)
            .json(&UpdateVersionRequest {
                version_number: version.to_string(),
            })
            .send()
            .await
            .map_err(|error| ApiError::request(OPERATION, error))?;

        if !response.status().is_success() {
            return Err(status_error(OPERATION, response).await);
        }

        info!("Reported installed launcher version {version}");
        Ok(())
    }
}
