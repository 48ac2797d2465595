//! A solicited INFORMATION frame gets a telemetry reply on the push channel
//! within 500 ms, with `buffer_size` matching live occupancy.

#[path = "support/mod.rs"]
mod support;

use std::time::Duration;
use support::stub_server::StubServer;
use xtables_client::router::encode_solicitation_id;
use xtables_client::{Category, ClientConfig, Command, PortTriple, Update, XTablesClient};
use xtables_protocol::stats;

fn config_for(server: &StubServer) -> ClientConfig {
    ClientConfig::new().host("127.0.0.1").ports(PortTriple {
        push: server.push_addr.port(),
        req: server.req_addr.port(),
        sub: server.sub_addr.port(),
    })
}

#[tokio::test]
async fn solicitation_is_answered_on_the_push_channel_within_500ms() {
    let server = StubServer::start().await;
    let client = XTablesClient::connect(config_for(&server)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    server.broadcast_update(&Update::new(
        Category::Information,
        "",
        encode_solicitation_id(0x1234),
    ));

    let mut found = None;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(message) = server
            .push_frames()
            .into_iter()
            .find(|m| m.id == Some(0x1234) && m.command == Command::Information)
        {
            found = Some(message);
            break;
        }
    }

    let message = found.expect("telemetry reply must arrive within 500ms");
    let stats = stats::decode_statistics(&message.value.unwrap()).unwrap();
    assert_eq!(stats.buffer_size as usize, client.buffer_occupancy());
}
