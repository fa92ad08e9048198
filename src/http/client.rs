//! HTTP client transport.
//!
//! # Responsibilities
//! - Build one endpoint per instance that POSTs JSON to `http://{instance}{path}`
//! - Forward the request id and bound each request by the call's deadline
//! - Translate statuses back into [`RpcError`]s
//!
//! # Design Decisions
//! - One shared `reqwest::Client` (and its connection pool) per factory; the
//!   instance URL is resolved at build time, dialing happens on first call
//! - Releasing the connection handle closes the endpoint: later calls fail
//!   with a transport error without touching the network
//! - A 400 body is decoded back into the business error it carries

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::discovery::Instance;
use crate::endpoint::{BoxEndpoint, CallContext, Endpoint};
use crate::error::RpcError;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::ErrorBody;
use crate::load_balancer::{ConnectionHandle, Factory};

/// A business error reported by a remote instance that the decoder did not recognise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

/// Turns a remote business error message into an [`RpcError`].
pub(crate) type ErrorDecoder = Arc<dyn Fn(&str) -> RpcError + Send + Sync>;

/// Decoder used until a typed one is installed: keeps the message as a [`RemoteError`].
pub(crate) fn remote_error(message: &str) -> RpcError {
    RpcError::application(RemoteError(message.to_string()))
}

/// [`Factory`] producing JSON-over-HTTP endpoints for one method path.
pub struct HttpFactory<Req, Resp> {
    client: reqwest::Client,
    path: String,
    decode_error: ErrorDecoder,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> HttpFactory<Req, Resp> {
    /// Factory with its own client bounded by `connect_timeout`.
    pub fn new(path: impl Into<String>, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client, path))
    }

    /// Factory sharing an existing client.
    pub fn with_client(client: reqwest::Client, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            decode_error: Arc::new(remote_error),
            _marker: PhantomData,
        }
    }

    /// Turn 400 error messages into typed business errors.
    pub fn with_error_decoder<F>(mut self, decode: F) -> Self
    where
        F: Fn(&str) -> RpcError + Send + Sync + 'static,
    {
        self.decode_error = Arc::new(decode);
        self
    }

    fn url_for(&self, instance: &Instance) -> Result<Url, RpcError> {
        instance_url(instance, &self.path)
    }
}

/// Resolve `http://{instance}{path}`; the scheme is optional, only http(s) is accepted.
pub(crate) fn instance_url(instance: &Instance, path: &str) -> Result<Url, RpcError> {
    let address = instance.as_str();
    let raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    let mut url = Url::parse(&raw).map_err(|e| RpcError::transport(format!("invalid instance `{address}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RpcError::transport(format!("invalid instance `{address}`")));
    }
    url.set_path(path);
    Ok(url)
}

impl<Req, Resp> Factory<Req, Resp> for HttpFactory<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    fn build(&self, instance: &Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> {
        let url = self.url_for(instance)?;
        let closed = Arc::new(AtomicBool::new(false));

        let endpoint: BoxEndpoint<Req, Resp> = Arc::new(HttpEndpoint {
            client: self.client.clone(),
            url,
            closed: closed.clone(),
            decode_error: self.decode_error.clone(),
            _marker: PhantomData,
        });
        let handle = ConnectionHandle::new(move || closed.store(true, Ordering::Release));
        Ok((endpoint, handle))
    }
}

struct HttpEndpoint<Req, Resp> {
    client: reqwest::Client,
    url: Url,
    closed: Arc<AtomicBool>,
    decode_error: ErrorDecoder,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Endpoint<Req, Resp> for HttpEndpoint<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    fn invoke(&self, ctx: CallContext, request: Req) -> BoxFuture<'static, Result<Resp, RpcError>> {
        if self.closed.load(Ordering::Acquire) {
            return Box::pin(future::ready(Err(RpcError::transport(format!(
                "connection to {} released",
                self.url
            )))));
        }

        let mut builder = self
            .client
            .post(self.url.clone())
            .header(X_REQUEST_ID, ctx.request_id().to_string())
            .json(&request);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }
        let decode_error = self.decode_error.clone();

        Box::pin(async move {
            let response = builder.send().await.map_err(map_reqwest_error)?;
            match response.status() {
                status if status.is_success() => response.json::<Resp>().await.map_err(map_reqwest_error),
                StatusCode::BAD_REQUEST => {
                    let body: ErrorBody = response.json().await.map_err(map_reqwest_error)?;
                    Err(decode_error(&body.error))
                }
                StatusCode::TOO_MANY_REQUESTS => Err(RpcError::RateLimited),
                status => Err(RpcError::transport(format!("unexpected status {status}"))),
            }
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::DeadlineExceeded
    } else {
        RpcError::transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> HttpFactory<(), ()> {
        HttpFactory::with_client(reqwest::Client::new(), "/sum")
    }

    #[test]
    fn test_instance_urls() {
        let f = factory();
        assert_eq!(f.url_for(&Instance::new("127.0.0.1:8081")).unwrap().as_str(), "http://127.0.0.1:8081/sum");
        assert_eq!(f.url_for(&Instance::new("localhost:8081")).unwrap().as_str(), "http://localhost:8081/sum");
        assert_eq!(
            f.url_for(&Instance::new("https://adder.internal")).unwrap().as_str(),
            "https://adder.internal/sum"
        );
        assert!(f.url_for(&Instance::new("ftp://adder.internal")).is_err());
        assert!(f.url_for(&Instance::new("http://")).is_err());
    }

    #[tokio::test]
    async fn test_released_endpoint_fails_locally() {
        let (endpoint, handle) = factory().build(&Instance::new("127.0.0.1:1")).unwrap();
        handle.release();
        let err = endpoint.invoke(CallContext::new(), ()).await.unwrap_err();
        match err {
            RpcError::Transport(msg) => assert!(msg.contains("released")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_decoder_keeps_message() {
        let f = factory();
        let err = (f.decode_error)("integer overflow");
        assert_eq!(err.to_string(), "integer overflow");
        assert!(err.downcast_application::<RemoteError>().is_some());
    }
}
