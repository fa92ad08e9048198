//! JSON-RPC client transport.
//!
//! # Responsibilities
//! - Build one endpoint per instance that posts a JSON-RPC 2.0 envelope to
//!   `http://{instance}/rpc`
//! - Use the call's request id as the envelope id and check it on the way back
//! - Translate error objects back into [`RpcError`]s
//!
//! # Design Decisions
//! - Shares the HTTP transport's client, URL resolution and release semantics;
//!   only the envelope and the error mapping differ
//! - HTTP 429 from a proxy in front of the instance is a rejection like
//!   `-32005`; any other non-200 status is a transport failure

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::discovery::Instance;
use crate::endpoint::{BoxEndpoint, CallContext, Endpoint};
use crate::error::RpcError;
use crate::http::client::{instance_url, map_reqwest_error, remote_error, ErrorDecoder};
use crate::http::request::X_REQUEST_ID;
use crate::jsonrpc::types::{JsonRpcRequest, JsonRpcResponse, RPC_PATH};
use crate::load_balancer::{ConnectionHandle, Factory};

/// [`Factory`] producing JSON-RPC endpoints for one remote method.
pub struct JsonRpcFactory<Req, Resp> {
    client: reqwest::Client,
    method: String,
    decode_error: ErrorDecoder,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> JsonRpcFactory<Req, Resp> {
    pub fn with_client(client: reqwest::Client, method: impl Into<String>) -> Self {
        Self {
            client,
            method: method.into(),
            decode_error: Arc::new(remote_error),
            _marker: PhantomData,
        }
    }

    /// Turn `-32000` error messages into typed business errors.
    pub fn with_error_decoder<F>(mut self, decode: F) -> Self
    where
        F: Fn(&str) -> RpcError + Send + Sync + 'static,
    {
        self.decode_error = Arc::new(decode);
        self
    }
}

impl<Req, Resp> Factory<Req, Resp> for JsonRpcFactory<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    fn build(&self, instance: &Instance) -> Result<(BoxEndpoint<Req, Resp>, ConnectionHandle), RpcError> {
        let url = instance_url(instance, RPC_PATH)?;
        let closed = Arc::new(AtomicBool::new(false));

        let endpoint: BoxEndpoint<Req, Resp> = Arc::new(JsonRpcEndpoint {
            client: self.client.clone(),
            url,
            method: self.method.clone(),
            closed: closed.clone(),
            decode_error: self.decode_error.clone(),
            _marker: PhantomData,
        });
        let handle = ConnectionHandle::new(move || closed.store(true, Ordering::Release));
        Ok((endpoint, handle))
    }
}

struct JsonRpcEndpoint<Req, Resp> {
    client: reqwest::Client,
    url: Url,
    method: String,
    closed: Arc<AtomicBool>,
    decode_error: ErrorDecoder,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Endpoint<Req, Resp> for JsonRpcEndpoint<Req, Resp>
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

        let params = match serde_json::to_value(&request) {
            Ok(params) => params,
            Err(e) => {
                return Box::pin(future::ready(Err(RpcError::transport(format!("encoding params: {e}")))));
            }
        };
        let id = Value::String(ctx.request_id().to_string());
        let envelope = JsonRpcRequest::new(self.method.clone(), Some(params), id.clone());

        let mut builder = self
            .client
            .post(self.url.clone())
            .header(X_REQUEST_ID, ctx.request_id().to_string())
            .json(&envelope);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }
        let decode_error = self.decode_error.clone();

        Box::pin(async move {
            let response = builder.send().await.map_err(map_reqwest_error)?;
            match response.status() {
                StatusCode::OK => {}
                StatusCode::TOO_MANY_REQUESTS => return Err(RpcError::RateLimited),
                status => return Err(RpcError::transport(format!("unexpected status {status}"))),
            }

            let reply: JsonRpcResponse = response.json().await.map_err(map_reqwest_error)?;
            if reply.id != id {
                return Err(RpcError::transport(format!("response id {} does not match {id}", reply.id)));
            }
            match (reply.result, reply.error) {
                (_, Some(error)) => Err(error.into_rpc_error(decode_error.as_ref())),
                (Some(result), None) => {
                    serde_json::from_value(result).map_err(|e| RpcError::transport(format!("decoding result: {e}")))
                }
                (None, None) => Err(RpcError::transport("response carries neither result nor error")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::jsonrpc::types::{JsonRpcError, LIMIT_EXCEEDED, SERVER_ERROR};

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("can't sum two zeroes")]
    struct TwoZeroes;

    /// Serve `/rpc` with a fixed answer builder; returns the address and hit count.
    async fn serve<F>(answer: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(JsonRpcRequest) -> JsonRpcResponse + Clone + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let app = Router::new().route(
            RPC_PATH,
            post(move |Json(request): Json<JsonRpcRequest>| {
                let answer = answer.clone();
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Json(answer(request)) }
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (address, hits)
    }

    fn factory() -> JsonRpcFactory<Value, Value> {
        JsonRpcFactory::with_client(reqwest::Client::new(), "sum")
            .with_error_decoder(|message| match message {
                "can't sum two zeroes" => RpcError::application(TwoZeroes),
                other => remote_error(other),
            })
    }

    #[tokio::test]
    async fn test_result_and_envelope() {
        let (address, _) = serve(|request| {
            assert_eq!(request.method, "sum");
            JsonRpcResponse::success(request.id, request.params.unwrap_or_default())
        })
        .await;
        let (endpoint, _handle) = factory().build(&Instance::new(address)).unwrap();

        let reply = endpoint.invoke(CallContext::new(), json!({ "a": 1 })).await.unwrap();
        assert_eq!(reply, json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_error_objects_map_back() {
        let (address, _) = serve(|request| {
            let error = match request.params.as_ref().and_then(|p| p["case"].as_str()) {
                Some("business") => JsonRpcError::new(SERVER_ERROR, "can't sum two zeroes"),
                _ => JsonRpcError::new(LIMIT_EXCEEDED, "rate limit exceeded"),
            };
            JsonRpcResponse::error(request.id, error)
        })
        .await;
        let (endpoint, _handle) = factory().build(&Instance::new(address)).unwrap();

        let err = endpoint
            .invoke(CallContext::new(), json!({ "case": "business" }))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_application::<TwoZeroes>(), Some(&TwoZeroes));

        let err = endpoint.invoke(CallContext::new(), json!({ "case": "limit" })).await.unwrap_err();
        assert!(matches!(err, RpcError::RateLimited));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_a_transport_failure() {
        let (address, _) = serve(|_request| JsonRpcResponse::success(json!("someone-else"), json!(1))).await;
        let (endpoint, _handle) = factory().build(&Instance::new(address)).unwrap();

        let err = endpoint.invoke(CallContext::new(), json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn test_released_endpoint_fails_locally() {
        let (address, hits) = serve(|request| JsonRpcResponse::success(request.id, json!(1))).await;
        let (endpoint, handle) = factory().build(&Instance::new(address)).unwrap();
        handle.release();

        let err = endpoint.invoke(CallContext::new(), json!({})).await.unwrap_err();
        match err {
            RpcError::Transport(msg) => assert!(msg.contains("released")),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
