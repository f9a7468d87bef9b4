//! HTTP chunk transport.
//!
//! Sends each chunk as a `multipart/form-data` POST to the upload endpoint
//! of the session's mode, and probes for already stored chunks with a GET
//! carrying the same parameters as query string.

use std::time::Duration;

use groupbin_protocol::constants::{CSRF_HEADER, DEFAULT_CONNECT_TIMEOUT, FILE_FIELD};
use groupbin_protocol::{ChunkErrorBody, ChunkForm, CompletionAction, SessionParams, UploadMode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use tracing::trace;

use crate::error::TransportError;
use crate::transport::{ChunkRequest, ChunkTransport, TransportFuture};

/// `reqwest`-backed transport bound to one upload endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport for `mode` on the server at `base_url`.
    ///
    /// `csrf_token`, when given, is sent in the CSRF header of every request.
    pub fn new(
        base_url: &str,
        mode: &UploadMode,
        csrf_token: Option<&str>,
    ) -> Result<Self, TransportError> {
        Self::with_connect_timeout(base_url, mode, csrf_token, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(
        base_url: &str,
        mode: &UploadMode,
        csrf_token: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidEndpoint(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = csrf_token {
            let name = HeaderName::from_bytes(CSRF_HEADER.as_bytes())
                .map_err(|e| TransportError::Other(e.to_string()))?;
            let value = HeaderValue::from_str(token)
                .map_err(|_| TransportError::Other("invalid CSRF token".into()))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{base_url}{}", mode.endpoint_path()),
            base_url: base_url.to_string(),
        })
    }

    /// Absolute URL chunks are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Absolute URL of the page to open once the session is complete.
    pub fn completion_url(&self, action: &CompletionAction) -> String {
        format!("{}{}", self.base_url, action.path())
    }

    async fn post_chunk(&self, request: ChunkRequest) -> Result<(), TransportError> {
        let mut form = Form::new();
        for (name, value) in request.fields() {
            form = form.text(name, value);
        }

        let mut part = Part::bytes(request.payload).file_name(request.form.filename.clone());
        if !request.form.content_type.is_empty() {
            part = part.mime_str(&request.form.content_type)?;
        }
        form = form.part(FILE_FIELD, part);

        trace!(
            identifier = %request.form.identifier,
            chunk = request.form.chunk_number,
            "posting chunk"
        );
        let resp = self.http.post(&self.endpoint).multipart(form).send().await?;
        check_status(resp).await
    }

    async fn probe_chunk(
        &self,
        form: ChunkForm,
        params: SessionParams,
    ) -> Result<bool, TransportError> {
        let query = form.fields(&params);
        let resp = self.http.get(&self.endpoint).query(&query).send().await?;
        // Any other answer means "send it".
        Ok(matches!(resp.status(), StatusCode::OK | StatusCode::CREATED))
    }
}

impl ChunkTransport for HttpTransport {
    fn send_chunk(&self, request: ChunkRequest) -> TransportFuture<'_, ()> {
        Box::pin(self.post_chunk(request))
    }

    fn test_chunk(&self, form: ChunkForm, params: SessionParams) -> TransportFuture<'_, bool> {
        Box::pin(self.probe_chunk(form, params))
    }
}

async fn check_status(resp: Response) -> Result<(), TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    let message = match ChunkErrorBody::message_from(&body) {
        m if m.is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        m => m,
    };
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}
