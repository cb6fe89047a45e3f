//! Request transport abstraction and the default HTTP implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One serialized call: a method, a path relative to the API root, and an
/// optional JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// Sends a request and returns the raw response body.
///
/// Implementations own retries and timeouts; callers never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Vec<u8>> {
        (**self).send(request).await
    }
}

/// Convenience impl so that `Box<dyn Transport>` can be used as the
/// transport parameter of [`crate::Client`].
#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&self, request: Request) -> Result<Vec<u8>> {
        (**self).send(request).await
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

    use super::{Method, Request, Transport};
    use crate::config::ClientConfig;
    use crate::error::{ChromaError, Result};

    /// reqwest-backed transport rooted at `{base_url}/api/v2`.
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        http: reqwest::Client,
        api_root: String,
    }

    impl HttpTransport {
        pub fn new(config: &ClientConfig) -> Result<Self> {
            config.validate()?;

            let mut headers = HeaderMap::new();
            for (name, value) in &config.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ChromaError::Config(format!("invalid header name `{name}`: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| ChromaError::Config(format!("invalid value for header `{name}`: {e}")))?;
                headers.insert(name, value);
            }

            let http = reqwest::Client::builder()
                .timeout(config.timeout)
                .default_headers(headers)
                .gzip(true)
                .build()?;

            Ok(Self {
                http,
                api_root: format!("{}/api/v2", config.base_url.trim_end_matches('/')),
            })
        }

        pub fn url(&self, path: &str) -> String {
            format!("{}/{}", self.api_root, path.trim_start_matches('/'))
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, request: Request) -> Result<Vec<u8>> {
            let url = self.url(&request.path);
            tracing::debug!(target: "chroma::http", method = %request.method, %url, "sending request");

            let mut builder = match request.method {
                Method::Get => self.http.get(&url),
                Method::Post => self.http.post(&url),
                Method::Delete => self.http.delete(&url),
            };
            if let Some(body) = request.body {
                builder = builder.header(CONTENT_TYPE, "application/json").body(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ChromaError::NotFound(
                    String::from_utf8_lossy(&body).into_owned(),
                ));
            }
            if !status.is_success() {
                tracing::debug!(target: "chroma::http", status = status.as_u16(), %url, "request failed");
                return Err(ChromaError::Http {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Ok(body.to_vec())
        }
    }

}
