//! End-to-end client behavior over an in-memory wire.

use std::sync::Arc;
use std::time::Duration;

use harmony_protocol::{ActivityId, HubEvent};
use harmony_sdk::{ClientError, HarmonyClient};
use harmony_stream::testing::{iq_reply, memory_wire, sent_correlation_id, MemoryHub};
use harmony_stream::{Session, SessionConfig, WireFormat};
use tokio::sync::mpsc;

const CONFIG_JSON: &str = r#"{
    "activity": [
        {"id": "-1", "label": "PowerOff", "type": "PowerOff", "controlGroup": []},
        {"id": "5", "label": "Watch TV", "type": "VirtualTelevisionN", "controlGroup": []}
    ],
    "device": [
        {
            "id": "37",
            "label": "Living Room TV",
            "manufacturer": "Samsung",
            "model": "UN55",
            "controlGroup": [
                {
                    "name": "Volume",
                    "function": [
                        {
                            "name": "VolumeUp",
                            "label": "Volume Up",
                            "action": "{\"type\":\"IRCommand\",\"deviceId\":\"37\",\"command\":\"VolumeUp\"}"
                        }
                    ]
                }
            ]
        }
    ]
}"#;

fn client_pair(config: SessionConfig) -> (Arc<HarmonyClient>, MemoryHub) {
    let (wire, hub) = memory_wire(WireFormat::Xmpp);
    let session = Session::from_wire(wire, config);
    (Arc::new(HarmonyClient::from_session(session)), hub)
}

fn fast_config() -> SessionConfig {
    SessionConfig::default().with_request_timeout(Duration::from_millis(500))
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Answer the next request on the wire with a 200 reply carrying `body`.
async fn answer(hub: &mut MemoryHub, body: &str) -> String {
    let sent = hub.sent().await.expect("request on the wire");
    let id = sent_correlation_id(&sent).expect("correlation id");
    hub.push(iq_reply(&id, "200", body));
    sent
}

#[tokio::test]
async fn fetches_and_caches_the_catalog() {
    let (client, mut hub) = client_pair(fast_config());
    assert!(client.cached_config().is_none());

    let fetch = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.get_config().await }
    });
    let sent = answer(&mut hub, CONFIG_JSON).await;
    assert!(sent.contains("vnd.logitech.harmony.engine?config"));

    let config = fetch.await.unwrap().unwrap();
    assert_eq!(config.activities.len(), 2);
    assert_eq!(config.selectable_activities().count(), 1);
    assert_eq!(config.devices[0].label, "Living Room TV");
    assert!(client.cached_config().is_some());
}

#[tokio::test]
async fn current_activity_query_updates_cache() {
    let (client, mut hub) = client_pair(fast_config());

    let query = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.get_current_activity().await }
    });
    answer(&mut hub, "result=5").await;

    assert_eq!(query.await.unwrap().unwrap(), ActivityId::new(5));
    assert_eq!(client.current_activity(), Some(ActivityId::new(5)));
}

#[tokio::test]
async fn start_activity_succeeds_on_empty_reply() {
    let (client, mut hub) = client_pair(fast_config());

    let start = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_activity(ActivityId::new(5)).await }
    });
    let sent = answer(&mut hub, "").await;
    assert!(sent.contains("harmony.activityengine?runactivity"));
    assert!(sent.contains("activityId=5"));

    assert!(start.await.unwrap().unwrap());
    assert_eq!(client.current_activity(), Some(ActivityId::new(5)));
}

#[tokio::test]
async fn start_activity_retries_unanswered_attempts() {
    let config = fast_config()
        .with_request_timeout(Duration::from_millis(50))
        .with_start_activity_attempts(2);
    let (client, mut hub) = client_pair(config);

    let start = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_activity(ActivityId::new(5)).await }
    });

    let first = hub.sent().await.unwrap();
    let second = hub.sent().await.unwrap();
    assert!(first.contains("runactivity"));
    assert!(second.contains("runactivity"));
    assert_ne!(
        sent_correlation_id(&first),
        sent_correlation_id(&second)
    );

    assert!(!start.await.unwrap().unwrap());
}

#[tokio::test]
async fn unanswered_start_confirmed_by_push_event() {
    let config = fast_config().with_request_timeout(Duration::from_millis(200));
    let (client, mut hub) = client_pair(config);

    let start = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_activity(ActivityId::new(5)).await }
    });

    // The hub never replies to the request but announces the result.
    let _ = hub.sent().await.unwrap();
    hub.push(
        "<message><event xmlns=\"connect.logitech.com\" \
         type=\"harmony.engine?startActivityFinished\">\
         activityId=5:errorCode=0:errorString=</event></message>",
    );

    assert!(start.await.unwrap().unwrap());
    assert_eq!(client.current_activity(), Some(ActivityId::new(5)));
}

#[tokio::test]
async fn state_digest_event_moves_the_activity_cache() {
    let (client, hub) = client_pair(fast_config());

    hub.push(
        "<message><event xmlns=\"connect.logitech.com\" \
         type=\"connect.stateDigest?notify\">\
         {\"activityId\":\"-1\",\"activityStatus\":0}</event></message>",
    );

    let client2 = Arc::clone(&client);
    wait_until(move || client2.current_activity() == Some(ActivityId::POWER_OFF)).await;
}

#[tokio::test]
async fn power_off_is_a_noop_when_already_off() {
    let (client, mut hub) = client_pair(fast_config());

    let off = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.power_off().await }
    });
    let sent = answer(&mut hub, "result=-1").await;
    assert!(sent.contains("getCurrentActivity"));

    assert!(off.await.unwrap().unwrap());

    // Nothing else goes on the wire.
    let extra = tokio::time::timeout(Duration::from_millis(100), hub.sent()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn send_command_emits_press_then_release() {
    let (client, mut hub) = client_pair(fast_config());

    let send = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send_command("Living Room TV", "VolumeUp").await }
    });
    // The catalog is fetched on demand to resolve the device.
    answer(&mut hub, CONFIG_JSON).await;

    let press = hub.sent().await.unwrap();
    let release = hub.sent().await.unwrap();
    send.await.unwrap().unwrap();

    assert!(press.contains("\"deviceId\"::\"37\""));
    assert!(press.contains("\"command\"::\"VolumeUp\""));
    assert!(press.contains(":status=press"));
    assert!(release.contains(":status=release"));

    // The pair shares a base correlation id.
    let press_id = sent_correlation_id(&press).unwrap();
    let release_id = sent_correlation_id(&release).unwrap();
    assert_eq!(
        press_id.strip_suffix("-press"),
        release_id.strip_suffix("-release")
    );
}

#[tokio::test]
async fn send_command_rejects_unknown_device_and_command() {
    let (client, mut hub) = client_pair(fast_config());

    let send = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send_command("Garage Door", "Open").await }
    });
    answer(&mut hub, CONFIG_JSON).await;
    assert!(matches!(
        send.await.unwrap(),
        Err(ClientError::DeviceNotFound(_))
    ));

    // Catalog is cached now; no further fetch happens.
    let send = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send_command("Living Room TV", "Rewind").await }
    });
    assert!(matches!(
        send.await.unwrap(),
        Err(ClientError::CommandNotFound { .. })
    ));
}

#[tokio::test]
async fn start_activity_named_resolves_labels() {
    let (client, mut hub) = client_pair(fast_config());

    let start = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_activity_named("Watch TV").await }
    });
    answer(&mut hub, CONFIG_JSON).await;
    let sent = answer(&mut hub, "").await;
    assert!(sent.contains("activityId=5"));
    assert!(start.await.unwrap().unwrap());

    let start = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.start_activity_named("Do Homework").await }
    });
    assert!(matches!(
        start.await.unwrap(),
        Err(ClientError::ActivityNotFound(_))
    ));
}

#[tokio::test]
async fn change_channel_and_sync_round_trip() {
    let (client, mut hub) = client_pair(fast_config());

    let change = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.change_channel("506").await }
    });
    let sent = answer(&mut hub, "").await;
    assert!(sent.contains("harmony.engine?changeChannel"));
    assert!(sent.contains("channel=506"));
    let outcome = change.await.unwrap().unwrap();
    assert_eq!(outcome.raw, None);

    // A reply body, when the hub sends one, comes back to the caller.
    let change = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.change_channel("507").await }
    });
    answer(&mut hub, "status=busy").await;
    let outcome = change.await.unwrap().unwrap();
    assert_eq!(outcome.raw.as_deref(), Some("status=busy"));

    let sync = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.sync().await }
    });
    let sent = answer(&mut hub, "").await;
    assert!(sent.contains("setup.sync"));
    sync.await.unwrap().unwrap();
}

#[tokio::test]
async fn listeners_observe_push_events() {
    let (client, hub) = client_pair(fast_config());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = client.on_event(move |event| {
        let _ = tx.send(event.clone());
    });

    hub.push(
        "<message><event xmlns=\"connect.logitech.com\" \
         type=\"automation.state?notify\">\
         {\"hue.light1\":{\"status\":1,\"brightness\":120,\"on\":true}}</event></message>",
    );

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, HubEvent::AutomationStateChanged { .. }));

    client.remove_listener(id);
}

#[tokio::test]
async fn disconnect_then_request_reports_not_connected() {
    let (client, _hub) = client_pair(fast_config());

    client.disconnect(true).await;
    client.disconnect(true).await;
    assert!(!client.is_connected());

    assert!(matches!(
        client.get_current_activity().await,
        Err(ClientError::NotConnected)
    ));
}
