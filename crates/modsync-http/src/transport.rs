//! `TransportPort` over `reqwest`.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use modsync_core::{
    ApiCall, ApiRequest, CachePolicy, ModError, ModResult, ProgressSink, TransportPort,
};

use crate::cache::ResponseCache;
use crate::config::HttpTransportConfig;
use crate::endpoint::{self, Endpoint};
use crate::error::{ApiErrorBody, HttpError, HttpResult};

const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Catalog transport with retries and a response cache.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    cache: ResponseCache,
}

impl ReqwestTransport {
    pub fn new(config: HttpTransportConfig) -> ModResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(HttpError::from)?;
        Ok(Self {
            client,
            cache: ResponseCache::new(config.cache_ttl),
            config,
        })
    }

    fn request(&self, endpoint: &Endpoint, token: Option<&str>) -> RequestBuilder {
        let request = self
            .client
            .request(endpoint.method.clone(), endpoint.url.clone())
            .header(ACCEPT, "application/json");
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request built by `build`, retrying server errors and network
    /// failures with exponential backoff.
    async fn send_with_retry(&self, build: impl Fn() -> RequestBuilder) -> HttpResult<Response> {
        let mut attempt = 0u8;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(err) => Err(err.into()),
            };
            match result {
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        target: "modsync::http",
                        attempt,
                        error = %err,
                        "Retrying catalog request"
                    );
                }
                other => return other,
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressSink,
        expected_size: Option<u64>,
    ) -> HttpResult<()> {
        let url = Url::parse(url)?;
        let response = self.send_with_retry(|| self.client.get(url.clone())).await?;
        if let Some(total) = expected_size.or_else(|| response.content_length()) {
            progress.set_total(total);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(dest).await?;
        let mut chunks = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            if progress.is_cancelled() {
                return Err(HttpError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.add_progress(chunk.len() as u64);
        }
        file.flush().await?;

        match expected_size {
            Some(expected) if expected != written => Err(HttpError::SizeMismatch {
                expected,
                actual: written,
            }),
            _ => Ok(()),
        }
    }
}

/// Pass successful responses through and turn the rest into
/// [`HttpError::Status`].
async fn check_status(response: Response) -> HttpResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // The path only: the query carries the API key.
    let url = response.url().path().to_string();
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok());
    let body = response
        .bytes()
        .await
        .ok()
        .and_then(|body| ApiErrorBody::parse(&body));
    Err(HttpError::Status {
        status: status.as_u16(),
        url,
        body,
        retry_after_secs,
    })
}

fn log_failure(endpoint: &Endpoint, err: HttpError) -> ModError {
    tracing::warn!(
        target: "modsync::http",
        method = %endpoint.method,
        path = endpoint.url.path(),
        error = %err,
        "Catalog request failed"
    );
    err.into()
}

#[async_trait]
impl TransportPort for ReqwestTransport {
    async fn perform_request(&self, call: &ApiCall, cache: CachePolicy) -> ModResult<Vec<u8>> {
        let token = call.access_token.as_deref();
        if call.request.requires_auth() && token.is_none() {
            return Err(HttpError::MissingToken.into());
        }
        let endpoint = endpoint::build(&self.config.base_url, &self.config.api_key, call)
            .map_err(HttpError::from)?;
        let key = endpoint.cache_key(token);
        if endpoint.is_cacheable() && cache == CachePolicy::Allow {
            if let Some(body) = self.cache.get(&key) {
                tracing::trace!(target: "modsync::http", path = endpoint.url.path(), "Cache hit");
                return Ok(body);
            }
        }

        let timeout = self.config.timeout;
        let response = self
            .send_with_retry(|| self.request(&endpoint, token).timeout(timeout))
            .await
            .map_err(|err| log_failure(&endpoint, err))?;
        let body = response.bytes().await.map_err(HttpError::from)?.to_vec();
        tracing::debug!(
            target: "modsync::http",
            method = %endpoint.method,
            path = endpoint.url.path(),
            bytes = body.len(),
            "Catalog request completed"
        );

        if endpoint.is_cacheable() {
            self.cache.insert(key, body.clone());
        } else {
            self.cache.clear();
        }
        Ok(body)
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
        expected_size: Option<u64>,
    ) -> ModResult<()> {
        match self.download(url, dest, &*progress, expected_size).await {
            Ok(()) => {
                tracing::debug!(target: "modsync::http", dest = %dest.display(), "Download finished");
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(dest).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        tracing::debug!(
                            target: "modsync::http",
                            dest = %dest.display(),
                            error = %cleanup,
                            "Failed to remove partial download"
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn upload_file(
        &self,
        call: &ApiCall,
        file: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<Vec<u8>> {
        let ApiRequest::SubmitModfile { params, .. } = &call.request else {
            return Err(ModError::invalid_parameters(
                "only modfile submissions carry a file",
            ));
        };
        let token = call
            .access_token
            .as_deref()
            .ok_or(HttpError::MissingToken)?;
        let endpoint = endpoint::build(&self.config.base_url, &self.config.api_key, call)
            .map_err(HttpError::from)?;

        let data = Arc::new(fs::read(file).await.map_err(HttpError::from)?);
        let total = data.len() as u64;
        progress.set_total(total);
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("modfile.zip")
            .to_string();

        let sink = Arc::clone(&progress);
        let body = stream::iter((0..data.len()).step_by(UPLOAD_CHUNK_SIZE)).map(move |start| {
            if sink.is_cancelled() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
            }
            let end = (start + UPLOAD_CHUNK_SIZE).min(data.len());
            sink.add_progress((end - start) as u64);
            Ok(data[start..end].to_vec())
        });
        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file_name)
            .mime_str("application/zip")
            .map_err(HttpError::from)?;
        let form = endpoint::modfile_fields(params)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
            .part("filedata", part);

        let result = match self.request(&endpoint, Some(token)).multipart(form).send().await {
            Ok(response) => check_status(response).await,
            Err(_) if progress.is_cancelled() => Err(HttpError::Cancelled),
            Err(err) => Err(err.into()),
        };
        let response = result.map_err(|err| log_failure(&endpoint, err))?;
        let body = response.bytes().await.map_err(HttpError::from)?.to_vec();
        self.cache.clear();
        tracing::info!(
            target: "modsync::http",
            path = endpoint.url.path(),
            bytes = total,
            "Modfile uploaded"
        );
        Ok(body)
    }
}
