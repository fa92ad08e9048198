//! The gateway speaking JSON-RPC to real add-service instances.

mod common;

use common::{gateway_config, start_service, TestGateway};
use resilient_rpc::addsvc::ServiceError;
use resilient_rpc::config::{LimitConfig, Protocol, ServiceConfig};
use resilient_rpc::{CallContext, RpcError};

fn json_rpc_gateway() -> TestGateway {
    let mut config = gateway_config();
    config.transport.protocol = Protocol::JsonRpc;
    TestGateway::start(config)
}

#[tokio::test]
async fn test_calls_travel_as_json_rpc() {
    let a = start_service(ServiceConfig::default()).await;
    let b = start_service(ServiceConfig::default()).await;
    let gw = json_rpc_gateway();
    gw.set_instances(&[&a, &b]).await;

    let endpoints = gw.gateway.endpoints();
    assert_eq!(endpoints.concat(CallContext::new(), "foo", "bar").await.unwrap(), "foobar");
    assert_eq!(endpoints.concat(CallContext::new(), "baz", "qux").await.unwrap(), "bazqux");

    let err = endpoints.concat(CallContext::new(), "0123456", "789ab").await.unwrap_err();
    assert_eq!(err.downcast_application::<ServiceError>(), Some(&ServiceError::MaxSizeExceeded));

    gw.stop().await;
}

#[tokio::test]
async fn test_business_error_is_typed_and_final() {
    let instance = start_service(ServiceConfig::default()).await;
    let gw = json_rpc_gateway();
    gw.set_instances(&[&instance]).await;

    let err = gw.gateway.endpoints().sum(CallContext::new(), 0, 0).await.unwrap_err();
    assert_eq!(err.downcast_application::<ServiceError>(), Some(&ServiceError::TwoZeroes));

    gw.stop().await;
}

#[tokio::test]
async fn test_remote_limit_exceeded_surfaces_as_rate_limited() {
    let mut service = ServiceConfig::default();
    service.sum_limit = LimitConfig {
        capacity: 1,
        refill_rate: 0.001,
    };
    let instance = start_service(service).await;
    let gw = json_rpc_gateway();
    gw.set_instances(&[&instance]).await;

    let endpoints = gw.gateway.endpoints();
    assert_eq!(endpoints.sum(CallContext::new(), 1, 2).await.unwrap(), 3);
    let err = endpoints.sum(CallContext::new(), 1, 2).await.unwrap_err();
    assert!(matches!(err, RpcError::RateLimited), "got {err:?}");

    gw.stop().await;
}
