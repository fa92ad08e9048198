//! JSON-RPC server side of the add service.
//!
//! # Design Decisions
//! - Every envelope is answered with HTTP 200; failures travel in `error`
//! - A string id that is a UUID becomes the call's request id, so a call
//!   keeps its id across the gateway hop
//! - The body is parsed by hand so a malformed envelope still gets a
//!   JSON-RPC parse error instead of axum's rejection

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::addsvc::Endpoints;
use crate::endpoint::{BoxEndpoint, CallContext, Endpoint};
use crate::http::request::context_from_headers;
use crate::jsonrpc::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR, RPC_PATH,
};

/// `POST /rpc` dispatching `sum` and `concat` to the endpoint set.
pub fn rpc_router(endpoints: Endpoints) -> Router {
    Router::new().route(RPC_PATH, post(rpc_handler)).with_state(endpoints)
}

async fn rpc_handler(State(endpoints): State<Endpoints>, headers: HeaderMap, body: Bytes) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed JSON-RPC body");
            return Json(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };

    let id = request.id.clone();
    if request.jsonrpc != JSONRPC_VERSION {
        return Json(JsonRpcResponse::error(
            id,
            JsonRpcError::new(INVALID_REQUEST, format!("unsupported version `{}`", request.jsonrpc)),
        ));
    }

    let ctx = context_for(&request.id, &headers);
    let outcome = match request.method.as_str() {
        "sum" => dispatch(&endpoints.sum, ctx, request.params).await,
        "concat" => dispatch(&endpoints.concat, ctx, request.params).await,
        other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("method `{other}` not found"))),
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::error(id, error),
    })
}

fn context_for(id: &Value, headers: &HeaderMap) -> CallContext {
    match id.as_str().and_then(|id| Uuid::parse_str(id).ok()) {
        Some(request_id) => CallContext::with_request_id(request_id),
        None => context_from_headers(headers),
    }
}

async fn dispatch<Req, Resp>(
    endpoint: &BoxEndpoint<Req, Resp>,
    ctx: CallContext,
    params: Option<Value>,
) -> Result<Value, JsonRpcError>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    let request: Req = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))?;
    let response = endpoint.invoke(ctx, request).await.map_err(|e| JsonRpcError::from(&e))?;
    serde_json::to_value(response).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::addsvc::BasicService;
    use crate::config::ServiceConfig;
    use crate::endpoint::endpoint_fn;
    use crate::jsonrpc::types::{LIMIT_EXCEEDED, SERVER_ERROR};

    fn app() -> Router {
        let config = ServiceConfig::default();
        rpc_router(Endpoints::server(Arc::new(BasicService), &config.sum_limit, &config.concat_limit))
    }

    async fn call(app: Router, body: String) -> JsonRpcResponse {
        let request = Request::builder()
            .method("POST")
            .uri(RPC_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn envelope(method: &str, params: Value, id: Value) -> String {
        serde_json::to_string(&JsonRpcRequest::new(method, Some(params), id)).unwrap()
    }

    #[tokio::test]
    async fn test_sum_result_echoes_id() {
        let reply = call(app(), envelope("sum", json!({ "a": 1, "b": 2 }), json!(7))).await;
        assert_eq!(reply.id, json!(7));
        assert_eq!(reply.result, Some(json!({ "v": 3 })));
        assert_eq!(reply.error, None);
    }

    #[tokio::test]
    async fn test_business_error_uses_server_error_code() {
        let reply = call(app(), envelope("concat", json!({ "a": "0123456", "b": "789ab" }), json!(1))).await;
        let error = reply.error.unwrap();
        assert_eq!(error.code, SERVER_ERROR);
        assert_eq!(error.message, "result exceeds maximum size");
        assert_eq!(reply.result, None);
    }

    #[tokio::test]
    async fn test_server_side_limit_reports_limit_exceeded() {
        let app = app();
        let first = call(app.clone(), envelope("sum", json!({ "a": 1, "b": 1 }), json!(1))).await;
        assert!(first.error.is_none());
        let second = call(app, envelope("sum", json!({ "a": 1, "b": 1 }), json!(2))).await;
        assert_eq!(second.error.unwrap().code, LIMIT_EXCEEDED);
    }

    #[tokio::test]
    async fn test_malformed_calls() {
        let reply = call(app(), "{not json".to_string()).await;
        assert_eq!(reply.error.unwrap().code, PARSE_ERROR);
        assert_eq!(reply.id, Value::Null);

        let reply = call(app(), envelope("multiply", json!({}), json!(3))).await;
        assert_eq!(reply.error.unwrap().code, METHOD_NOT_FOUND);
        assert_eq!(reply.id, json!(3));

        let reply = call(app(), envelope("sum", json!({ "a": "one" }), json!(4))).await;
        assert_eq!(reply.error.unwrap().code, INVALID_PARAMS);

        let reply = call(app(), r#"{"jsonrpc":"1.0","method":"sum","id":5}"#.to_string()).await;
        assert_eq!(reply.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_uuid_id_becomes_request_id() {
        let echo = endpoint_fn(|ctx: CallContext, _req: crate::addsvc::SumRequest| async move {
            Ok(crate::addsvc::SumResponse {
                v: (ctx.request_id().as_u128() % 1000) as i32,
            })
        });
        let config = ServiceConfig::default();
        let mut endpoints = Endpoints::server(Arc::new(BasicService), &config.sum_limit, &config.concat_limit);
        endpoints.sum = echo;

        let id = Uuid::new_v4();
        let reply = call(rpc_router(endpoints), envelope("sum", json!({ "a": 1, "b": 2 }), json!(id.to_string()))).await;
        assert_eq!(reply.result, Some(json!({ "v": (id.as_u128() % 1000) as i32 })));
    }
}
