//! The innermost link of every pipeline: performs the network call.

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use onion_core::{
    Body, BoxFuture, ContentType, Error, Method, Middleware, Next, Payload, Request, Response,
    ResponseType, Result, from_json, to_form, to_query_string,
};
use tracing::debug;

use crate::client::Transport;
use crate::pipeline::{Context, Options, RequestBody};

/// Sends the request described by the context and stores the response.
///
/// Failures are recorded in [`Context::error`] and returned. A 4xx or 5xx
/// status fails after the response has been stored, unless
/// [`Options::ignore_response_error`] is set.
#[derive(Debug, Clone)]
pub(crate) struct FetchMiddleware {
    transport: Transport,
}

impl FetchMiddleware {
    pub(crate) const fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl Middleware<Context> for FetchMiddleware {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a, Context>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = prepare(ctx).map_err(|e| fail(ctx, e))?;
            debug!(method = %request.method(), url = request.url(), "sending request");

            let response = self
                .transport
                .call(request)
                .await
                .map_err(|e| fail(ctx, e))?;
            debug!(status = response.status(), "response received");

            let extracted = extract(&ctx.options, response).await;
            let (response, raw) = extracted.map_err(|e| fail(ctx, e))?;
            let status = response.status();
            let failed = response.is_error();
            ctx.response = Some(response);

            if failed && !ctx.options.ignore_response_error {
                let message = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Request failed");
                let err = match raw {
                    Some(body) => Error::http_with_body(status, message, body),
                    None => Error::http(status, message),
                };
                return Err(fail(ctx, err));
            }

            next.run(ctx).await
        })
    }
}

fn fail(ctx: &mut Context, err: Error) -> Error {
    ctx.error = Some(err.clone());
    err
}

/// Encode the body, default the headers, resolve the address.
///
/// The context is updated in place so outer middlewares observe what was
/// actually sent.
fn prepare(ctx: &mut Context) -> Result<Request> {
    let options = &mut ctx.options;
    let method = options.method;

    let body = match options.body.take() {
        Some(body) => {
            let (body, bytes) = encode_body(body, method, &mut options.headers)?;
            options.body = Some(body);
            Some(bytes)
        }
        None => None,
    };

    if let Some(base_url) = options.base_url.as_deref().filter(|b| !b.is_empty()) {
        ctx.request = format!("{base_url}{}", ctx.request);
    }
    if !options.query.is_empty() {
        let query = to_query_string(&options.query)?;
        ctx.request = format!("{}?{query}", ctx.request);
    }

    let builder = Request::builder(method, ctx.request.as_str()).headers(options.headers.clone());
    Ok(match body {
        Some(bytes) => builder.body(bytes).build(),
        None => builder.build(),
    })
}

fn encode_body(
    body: RequestBody,
    method: Method,
    headers: &mut HeaderMap,
) -> Result<(RequestBody, Bytes)> {
    if body.is_json_serializable() && method.is_payload() {
        for name in [CONTENT_TYPE, ACCEPT] {
            if !headers.contains_key(&name) {
                headers.insert(name, ContentType::Json.header_value());
            }
        }
    }

    match body {
        RequestBody::Json(value) => {
            let text = serde_json::to_string(&value)?;
            let bytes = Bytes::from(text.clone());
            if method.is_payload() {
                Ok((RequestBody::Text(text), bytes))
            } else {
                Ok((RequestBody::Json(value), bytes))
            }
        }
        RequestBody::Text(text) => {
            let bytes = Bytes::from(text.clone());
            Ok((RequestBody::Text(text), bytes))
        }
        RequestBody::Bytes(bytes) => Ok((RequestBody::Bytes(bytes.clone()), bytes)),
        RequestBody::Form(fields) => {
            let bytes = to_form(&fields)?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, ContentType::FormUrlEncoded.header_value());
            }
            Ok((RequestBody::Form(fields), bytes))
        }
    }
}

/// Turn the transport body into a payload, keeping the buffered bytes for
/// error reporting.
async fn extract(
    options: &Options,
    response: Response<Body>,
) -> Result<(Response<Payload>, Option<Bytes>)> {
    let skip = options.method.is_bodiless() || response.is_bodiless_status();
    let is_error = response.is_error();
    let strategy = options
        .response_type
        .unwrap_or_else(|| ResponseType::detect(response.header(CONTENT_TYPE.as_str())));
    let (status, headers, body) = response.into_parts();

    if skip || body.is_empty() {
        return Ok((Response::new(status, headers, Payload::Empty), None));
    }
    if strategy == ResponseType::Stream {
        let payload = Payload::Stream(body.into_stream());
        return Ok((Response::new(status, headers, payload), None));
    }

    let bytes = body.collect().await?;
    if bytes.is_empty() {
        return Ok((Response::new(status, headers, Payload::Empty), None));
    }

    let payload = match decode(strategy, &bytes) {
        Ok(payload) => payload,
        // error pages rarely honor their content type
        Err(_) if is_error => Payload::Binary(bytes.clone()),
        Err(err) => return Err(err),
    };
    Ok((Response::new(status, headers, payload), Some(bytes)))
}

fn decode(strategy: ResponseType, bytes: &Bytes) -> Result<Payload> {
    Ok(match strategy {
        ResponseType::Json => Payload::Json(from_json(bytes)?),
        ResponseType::Text => Payload::Text(String::from_utf8_lossy(bytes).into_owned()),
        ResponseType::Blob | ResponseType::ArrayBuffer | ResponseType::Stream => {
            Payload::Binary(bytes.clone())
        }
    })
}
