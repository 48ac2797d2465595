//! Shutdown is idempotent and quiesces background tasks.

#[path = "support/mod.rs"]
mod support;

use std::time::Duration;
use support::stub_server::StubServer;
use xtables_client::{ClientConfig, PortTriple, XTablesClient};

fn config_for(server: &StubServer) -> ClientConfig {
    ClientConfig::new().host("127.0.0.1").ports(PortTriple {
        push: server.push_addr.port(),
        req: server.req_addr.port(),
        sub: server.sub_addr.port(),
    })
}

#[tokio::test]
async fn shutdown_twice_is_a_no_op_the_second_time() {
    let server = StubServer::start().await;
    let client = XTablesClient::connect(config_for(&server)).await.unwrap();

    client.shutdown();
    client.shutdown();

    // The reconnect loops observe the stop signal at their next suspension
    // point.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The push task has exited and dropped its receiver, so enqueueing
    // after shutdown reports failure rather than hanging or panicking.
    assert!(!client.put_boolean("k", true).unwrap());
}
