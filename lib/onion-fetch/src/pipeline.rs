//! Request pipeline: a per-call context run through global middlewares,
//! per-call middlewares, and the terminal network middleware, in that order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::header::IntoHeaderName;
use onion_core::{
    BoxFuture, Error, HeaderValue, Method, Middleware, Next, Payload, Response, ResponseType,
    Result, compose, to_query_string,
};
use serde::Serialize;
use tower_service::Service;
use tracing::{Instrument, debug_span};

use crate::client::{HyperClient, Transport};
use crate::config::ClientConfig;
use crate::middleware::{BearerAuth, Logging, middleware_fn};
use crate::terminal::FetchMiddleware;
use crate::{Body, Request};

/// A middleware shared between pipelines and calls.
pub type DynMiddleware = Arc<dyn Middleware<Context>>;

// ============================================================================
// Context
// ============================================================================

/// Mutable state of a single pipeline call.
///
/// Every middleware of the call receives exclusive access to the same
/// context, in chain order. A context is never reused across calls.
#[derive(Debug)]
pub struct Context {
    /// Target address; the terminal middleware prefixes the base URL and
    /// appends the query string.
    pub request: String,
    /// Call options.
    pub options: Options,
    /// Response, once produced by the terminal middleware or a middleware
    /// answering on its own.
    pub response: Option<Response<Payload>>,
    /// Failure recorded by the terminal middleware.
    pub error: Option<Error>,
}

impl Context {
    /// Creates a fresh context.
    #[must_use]
    pub fn new(request: impl Into<String>, options: Options) -> Self {
        Self {
            request: request.into(),
            options,
            response: None,
            error: None,
        }
    }

    /// Response status, if a response is present.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(Response::status)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Request body supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document, serialized before sending.
    Json(serde_json::Value),
    /// Text, sent as-is with JSON headers on payload methods.
    Text(String),
    /// Raw bytes, sent untouched.
    Bytes(Bytes),
    /// Key/value pairs, url-encoded before sending.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Returns `true` for bodies that get JSON encoding and headers.
    #[must_use]
    pub const fn is_json_serializable(&self) -> bool {
        matches!(self, Self::Json(_) | Self::Text(_))
    }
}

/// Per-call configuration bag.
///
/// Fields are public so middlewares can adjust them; the consuming methods
/// build a value fluently.
///
/// ```
/// use onion_fetch::{Method, Options, ResponseType};
///
/// let options = Options::new()
///     .method(Method::Post)
///     .json(serde_json::json!({ "num": 42 }))
///     .query("page", "1")
///     .response_type(ResponseType::Text);
/// assert_eq!(options.method, Method::Post);
/// ```
#[derive(Clone, Default)]
pub struct Options {
    /// HTTP method, GET by default.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Query parameters, appended in order.
    pub query: Vec<(String, String)>,
    /// Decoding strategy; detected from `content-type` when unset.
    pub response_type: Option<ResponseType>,
    /// Base URL; the pipeline default applies when unset.
    pub base_url: Option<String>,
    /// Middlewares running after the global ones for this call only.
    pub middlewares: Vec<DynMiddleware>,
    /// Keep 4xx and 5xx responses instead of failing the call.
    pub ignore_response_error: bool,
}

impl Options {
    /// Default options: GET, no headers, no body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    ///
    /// Method names from configuration parse case-insensitively:
    /// `"post".parse::<Method>()`.
    #[must_use]
    pub const fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge headers, replacing previous values of the same names.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn json(self, value: impl Into<serde_json::Value>) -> Self {
        self.body(RequestBody::Json(value.into()))
    }

    /// Set a text body.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(RequestBody::Text(text.into()))
    }

    /// Set a raw body.
    #[must_use]
    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.body(RequestBody::Bytes(bytes.into()))
    }

    /// Set a url-encoded form body.
    #[must_use]
    pub fn form<K, V>(self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.body(RequestBody::Form(fields))
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append query parameters from any serializable map or struct.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` cannot be url-encoded (nested structures).
    pub fn query_params<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self> {
        let encoded = to_query_string(params)?;
        let pairs: Vec<(String, String)> = serde_html_form::from_str(&encoded)
            .map_err(|e| Error::configuration(format!("query parameters: {e}")))?;
        self.query.extend(pairs);
        Ok(self)
    }

    /// Force the response decoding strategy.
    #[must_use]
    pub const fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Override the pipeline base URL for this call.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a middleware for this call only.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware<Context>) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Keep 4xx and 5xx responses instead of failing the call.
    #[must_use]
    pub const fn ignore_response_error(mut self, ignore: bool) -> Self {
        self.ignore_response_error = ignore;
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("response_type", &self.response_type)
            .field("base_url", &self.base_url)
            .field("middlewares", &self.middlewares.len())
            .field("ignore_response_error", &self.ignore_response_error)
            .finish()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Global pipeline configuration.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Base URL applied to calls that set none.
    pub base_url: Option<String>,
    /// Middlewares running first on every call.
    pub middlewares: Vec<DynMiddleware>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Configured request pipeline.
///
/// Cloning is cheap: clones share the global middlewares and the transport.
///
/// # Example
///
/// ```ignore
/// use onion_fetch::{Options, Pipeline};
///
/// let pipeline = Pipeline::builder()
///     .base_url("https://api.example.com")
///     .with_logging()
///     .build();
///
/// let users: Vec<User> = pipeline.json("/users", Options::new()).await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    terminal: DynMiddleware,
}

impl Pipeline {
    /// Create a pipeline over the default hyper transport.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let transport = Transport::new(HyperClient::new());
        Self::with_transport(config, transport)
    }

    /// Create a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    fn with_transport(config: PipelineConfig, transport: Transport) -> Self {
        Self {
            config: Arc::new(config),
            terminal: Arc::new(FetchMiddleware::new(transport)),
        }
    }

    /// Global configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a call and return the extracted payload.
    ///
    /// Resolves to [`Payload::Empty`] when no body was read, or when a
    /// middleware ended the chain without supplying a response.
    ///
    /// # Errors
    ///
    /// Returns the first error raised and not recovered by a middleware.
    pub async fn fetch(&self, resource: impl Into<String>, options: Options) -> Result<Payload> {
        let ctx = self.dispatch(resource.into(), options).await?;
        Ok(ctx.response.map_or(Payload::Empty, Response::into_body))
    }

    /// Run a call and return the whole response.
    ///
    /// # Errors
    ///
    /// Returns the first error raised and not recovered by a middleware, or
    /// [`Error::MissingResponse`] when the chain produced no response.
    pub async fn raw(
        &self,
        resource: impl Into<String>,
        options: Options,
    ) -> Result<Response<Payload>> {
        let ctx = self.dispatch(resource.into(), options).await?;
        ctx.response.ok_or(Error::MissingResponse)
    }

    /// Run a call and deserialize the payload.
    ///
    /// # Errors
    ///
    /// Returns the call error, or a deserialization error naming the path of
    /// the offending field.
    pub async fn json<T: serde::de::DeserializeOwned>(
        &self,
        resource: impl Into<String>,
        options: Options,
    ) -> Result<T> {
        self.fetch(resource, options).await?.json()
    }

    async fn dispatch(&self, resource: String, mut options: Options) -> Result<Context> {
        if options.base_url.is_none() {
            options.base_url.clone_from(&self.config.base_url);
        }

        let chain = compose(
            self.config
                .middlewares
                .iter()
                .chain(&options.middlewares)
                .chain([&self.terminal])
                .cloned(),
        );

        let span = debug_span!("pipeline", method = %options.method, url = %resource);
        let mut ctx = Context::new(resource, options);
        chain.run(&mut ctx).instrument(span).await?;

        Ok(ctx)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    transport: Option<Transport>,
    client_config: ClientConfig,
}

impl PipelineBuilder {
    /// Set the default base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Append a global middleware.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware<Context>) -> Self {
        self.config.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append a global middleware written as a closure.
    #[must_use]
    pub fn middleware_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, Next<'a, Context>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.middleware(middleware_fn(f))
    }

    /// Log every call with [`Logging`].
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.middleware(Logging::new())
    }

    /// Authenticate every call with a static bearer token.
    #[must_use]
    pub fn with_bearer_auth(self, token: impl Into<String>) -> Self {
        self.middleware(BearerAuth::new(token))
    }

    /// Use a custom transport instead of [`HyperClient`].
    #[must_use]
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: Service<Request, Response = Response<Body>, Error = Error> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(Transport::new(transport));
        self
    }

    /// Configure the default [`HyperClient`] transport.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Set the default transport timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.client_config.timeout = timeout;
        self
    }

    /// Build the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let transport = self
            .transport
            .unwrap_or_else(|| Transport::new(HyperClient::with_config(self.client_config)));
        Pipeline::with_transport(self.config, transport)
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("client_config", &self.client_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde::Serialize;

    use super::*;

    #[test]
    fn options_defaults() {
        let options = Options::new();
        check!(options.method == Method::Get);
        check!(options.headers.is_empty());
        check!(options.body.is_none());
        check!(options.base_url.is_none());
        check!(!options.ignore_response_error);
    }

    #[test]
    fn options_builder() {
        let options = Options::new()
            .method("patch".parse().expect("known method"))
            .header("x-trace", HeaderValue::from_static("1"))
            .text("raw")
            .query("a", "1")
            .query("b", "x y")
            .base_url("http://h")
            .ignore_response_error(true);

        check!(options.method == Method::Patch);
        check!(options.headers.get("x-trace").is_some());
        check!(options.body == Some(RequestBody::Text("raw".to_string())));
        check!(options.query.len() == 2);
        check!(options.base_url.as_deref() == Some("http://h"));
        check!(options.ignore_response_error);
    }

    #[test]
    fn query_params_from_struct() {
        #[derive(Serialize)]
        struct Search {
            q: &'static str,
            page: u32,
            tag: Option<&'static str>,
        }

        let options = Options::new()
            .query("first", "1")
            .query_params(&Search {
                q: "rust lang",
                page: 2,
                tag: None,
            })
            .expect("flat struct");

        assert_eq!(
            options.query,
            [
                ("first".to_string(), "1".to_string()),
                ("q".to_string(), "rust lang".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn query_params_rejects_nested_values() {
        let result = Options::new().query_params(&serde_json::json!({ "a": { "b": 1 } }));
        let_assert!(Err(_) = result);
    }

    #[test]
    fn form_body_keeps_field_order() {
        let options = Options::new().form([("b", "2"), ("a", "1")]);
        let_assert!(Some(RequestBody::Form(fields)) = options.body);
        assert_eq!(fields[0].0, "b");
        assert_eq!(fields[1].0, "a");
    }

    #[test]
    fn json_and_text_bodies_are_json_serializable() {
        check!(RequestBody::Json(serde_json::json!(1)).is_json_serializable());
        check!(RequestBody::Text(String::new()).is_json_serializable());
        check!(!RequestBody::Bytes(Bytes::new()).is_json_serializable());
        check!(!RequestBody::Form(Vec::new()).is_json_serializable());
    }

    #[test]
    fn builder_keeps_global_configuration() {
        let pipeline = Pipeline::builder()
            .base_url("http://h/base")
            .with_logging()
            .with_bearer_auth("token")
            .timeout(Duration::from_secs(5))
            .build();

        check!(pipeline.config().base_url.as_deref() == Some("http://h/base"));
        check!(pipeline.config().middlewares.len() == 2);
    }

    #[test]
    fn context_starts_without_response() {
        let ctx = Context::new("/ok", Options::new());
        check!(ctx.request == "/ok");
        check!(ctx.status().is_none());
        check!(ctx.error.is_none());
    }
}
