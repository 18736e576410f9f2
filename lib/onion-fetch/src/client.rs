//! The fetch primitive: transports that execute a single request.
//!
//! A transport is any [`tower::Service`] taking a [`Request`] and producing a
//! [`Response<Body>`]. [`HyperClient`] is the default one; tests and custom
//! stacks can hand any other service to the pipeline builder, for example one
//! built with [`tower::service_fn`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyStream, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::ServiceExt;
use tower::util::BoxCloneService;
use tower_service::Service;
use tracing::debug;

use crate::{
    Body, Error, Request, Response, Result, StreamingBody,
    config::{ClientConfig, ClientConfigBuilder},
    connector::https_connector,
};

// ============================================================================
// Type-Erased Transport
// ============================================================================

/// Type-erased transport service.
pub type BoxedTransport = BoxCloneService<Request, Response<Body>, Error>;

/// Future returned by transports.
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<Response<Body>>> + Send + 'static>>;

/// Thread-safe, cloneable handle to a transport.
///
/// The boxed service is kept behind a mutex only to make it `Sync`; each call
/// clones the service and releases the lock right away.
#[derive(Clone)]
pub(crate) struct Transport {
    inner: Arc<Mutex<BoxedTransport>>,
}

impl Transport {
    pub(crate) fn new<S>(service: S) -> Self
    where
        S: Service<Request, Response = Response<Body>, Error = Error> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(BoxCloneService::new(service))),
        }
    }

    pub(crate) fn call(&self, request: Request) -> TransportFuture {
        let service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(service.oneshot(request))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

// ============================================================================
// Hyper Client
// ============================================================================

/// HTTP transport using hyper-util with connection pooling and rustls TLS.
///
/// Response bodies are handed over as streams; the pipeline decides whether
/// to buffer them.
///
/// # Example
///
/// ```ignore
/// use onion_fetch::HyperClient;
/// use std::time::Duration;
///
/// let client = HyperClient::builder()
///     .timeout(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Clone)]
pub struct HyperClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: ClientConfig,
}

impl fmt::Debug for HyperClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperClient {
    /// Create a new client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let connector = https_connector(&config);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(connector);

        Self { inner, config }
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> HyperClientBuilder {
        HyperClientBuilder::default()
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a hyper request from a pipeline request.
    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut http_request = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .body(body.map_or_else(Full::default, Full::new))
            .map_err(|e| Error::invalid_request(format!("{url}: {e}")))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }

    /// Execute a request, returning as soon as the response headers arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, the connection fails,
    /// or no response arrives within the configured timeout.
    pub async fn execute(&self, request: Request) -> Result<Response<Body>> {
        let hyper_request = Self::build_hyper_request(request)?;
        debug!(method = %hyper_request.method(), uri = %hyper_request.uri(), "hyper request");

        let response = tokio::time::timeout(self.config.timeout, self.inner.request(hyper_request))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Self::map_hyper_error)?;

        let (parts, incoming) = response.into_parts();
        let body: StreamingBody = Box::pin(
            BodyStream::new(incoming)
                .map_ok(|frame| frame.into_data().unwrap_or_default())
                .map_err(|e| Error::connection(e.to_string())),
        );

        Ok(Response::new(
            parts.status.as_u16(),
            parts.headers,
            Body::Stream(body),
        ))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Default for HyperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request> for HyperClient {
    type Response = Response<Body>;
    type Error = Error;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

/// Builder for [`HyperClient`].
#[derive(Debug, Default)]
pub struct HyperClientBuilder {
    config: ClientConfigBuilder,
}

impl HyperClientBuilder {
    /// Set the time allowed until response headers are received.
    #[must_use]
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> HyperClient {
        HyperClient::with_config(self.config.build())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Method;

    #[test]
    fn client_default() {
        let client = HyperClient::new();
        assert_eq!(client.config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn client_builder() {
        let client = HyperClient::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .build();

        assert_eq!(client.config().timeout, Duration::from_secs(60));
        assert_eq!(client.config().pool_idle_per_host, 16);
    }

    #[test]
    fn unparsable_address_is_an_invalid_request() {
        let request = Request::builder(Method::Get, "/no-host").build();
        let result = HyperClient::build_hyper_request(request);
        assert!(result.is_ok(), "a path-only URI is still a valid http::Uri");

        let request = Request::builder(Method::Get, "http://h/a b").build();
        let err = HyperClient::build_hyper_request(request).expect_err("space in URI");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn transport_calls_the_wrapped_service() {
        let transport = Transport::new(tower::service_fn(|request: Request| async move {
            Ok::<_, Error>(Response::new(
                200,
                http::HeaderMap::new(),
                Body::from(request.url().to_string()),
            ))
        }));

        let response = transport
            .call(Request::builder(Method::Get, "http://h/echo").build())
            .await
            .expect("response");
        let body = response.into_body().collect().await.expect("body");
        assert_eq!(body, Bytes::from("http://h/echo"));
    }
}
