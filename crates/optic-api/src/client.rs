//! Single-request HTTP client for the inference API.

use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

const DEFAULT_MAX_RESPONSE_BYTES: usize = 100 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("empty response body from {0}")]
    EmptyResponse(String),
    #[error("response from {url} is {size} bytes, limit is {limit}")]
    ResponseTooLarge { url: String, size: usize, limit: usize },
    #[error("failed to encode request image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to encode request body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),
}

/// Inference server routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    FaceEmbedding,
    CompareFace,
    ClassifyImage,
    DetectObjects,
    EstimatePose,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::FaceEmbedding => "/v1/face2embedding",
            Endpoint::CompareFace => "/v1/compareface",
            Endpoint::ClassifyImage => "/v1/classifyimage",
            Endpoint::DetectObjects => "/v1/detectobjects",
            Endpoint::EstimatePose => "/v1/estimatepose",
        }
    }
}

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server base URL, e.g. `http://localhost:9900`.
    pub base_url: String,
    pub max_connections_per_host: usize,
    pub max_response_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9900".to_string(),
            max_connections_per_host: 1,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// HTTP client bound to one inference server.
///
/// Each call sends one request and awaits its body; there is no retry,
/// timeout or cancellation.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    max_response_bytes: usize,
}

impl ApiClient {
    pub fn new(options: ClientOptions) -> Result<Self, ApiError> {
        let client = Client::builder()
            .pool_max_idle_per_host(options.max_connections_per_host)
            .build()
            .map_err(ApiError::Build)?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            max_response_bytes: options.max_response_bytes,
        })
    }

    /// Full URL for `endpoint` on this server.
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Encode `image` as JPEG and POST it to `endpoint`. Returns the raw body.
    pub async fn post_image(
        &self,
        endpoint: Endpoint,
        image: &DynamicImage,
    ) -> Result<String, ApiError> {
        let jpeg = encode_jpeg(image)?;
        tracing::debug!(endpoint = endpoint.path(), bytes = jpeg.len(), "encoded request image");
        let url = self.url(endpoint);
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg);
        self.send(url, request).await
    }

    /// Serialize `body` as JSON and POST it to `endpoint`. Returns the raw body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<String, ApiError> {
        let payload = serde_json::to_vec(body)?;
        let url = self.url(endpoint);
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        self.send(url, request).await
    }

    async fn send(&self, url: String, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(source) => return Err(ApiError::Transport { url, source }),
        };

        let status = response.status();
        tracing::info!(url = %url, status = status.as_u16(), "response received");

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_bytes {
                return Err(ApiError::ResponseTooLarge {
                    url,
                    size: len as usize,
                    limit: self.max_response_bytes,
                });
            }
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(source) => return Err(ApiError::Transport { url, source }),
        };

        if body.len() > self.max_response_bytes {
            return Err(ApiError::ResponseTooLarge {
                url,
                size: body.len(),
                limit: self.max_response_bytes,
            });
        }
        if body.is_empty() {
            return Err(ApiError::EmptyResponse(url));
        }

        tracing::debug!(url = %url, bytes = body.len(), "response body read");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Encode an image as JPEG. Alpha is dropped; JPEG has no alpha channel.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, image::ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}
