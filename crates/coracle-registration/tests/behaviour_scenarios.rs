//! End-to-end scenarios for the node behaviour engine
//!
//! The engine runs against scripted doubles under tokio's paused clock, so
//! heartbeat intervals and discovery backoff are observed as exact virtual
//! durations.

mod common;

use common::{
    service, wait_until_true, CannedBrowser, RecordingAdvertiser, ScriptedHttpClient,
};
use coracle_core::http::HttpMethod;
use coracle_core::settings::Settings;
use coracle_model::{ApiVersion, Id, Resource, ResourceType, SharedModel};
use coracle_registration::{NodeBehaviour, PassthroughDowngrade};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const FALLBACK_BASE: &str = "http://reg.local:3210/x-nmos/registration/v1.2";

fn node_resource(id: &Id) -> Resource {
    Resource::new(
        id.clone(),
        ResourceType::Node,
        ApiVersion::V1_3,
        json!({"id": id.as_str(), "label": "node"}),
    )
}

fn device_resource(id: &Id) -> Resource {
    Resource::new(
        id.clone(),
        ResourceType::Device,
        ApiVersion::V1_3,
        json!({"id": id.as_str(), "label": "device"}),
    )
}

fn sender_resource(id: &Id) -> Resource {
    Resource::new(
        id.clone(),
        ResourceType::Sender,
        ApiVersion::V1_3,
        json!({"id": id.as_str(), "label": "sender"}),
    )
}

fn fallback_settings() -> Settings {
    Settings {
        registry_address: Some("reg.local".into()),
        ..Settings::default()
    }
}

struct Fixture {
    shared: Arc<SharedModel>,
    worker: tokio::task::JoinHandle<coracle_core::error::Result<()>>,
}

fn spawn_engine(
    settings: Settings,
    http: Arc<ScriptedHttpClient>,
    browser: Arc<CannedBrowser>,
    advertiser: Arc<RecordingAdvertiser>,
    resources: Vec<Resource>,
) -> Fixture {
    let shared = Arc::new(SharedModel::new(settings));

    {
        let mut state = shared.lock();
        for resource in resources {
            state.resources.insert(resource).unwrap();
        }
    }

    let behaviour = NodeBehaviour::new(
        shared.clone(),
        http,
        browser,
        advertiser,
        Arc::new(PassthroughDowngrade),
    );

    Fixture {
        shared,
        worker: tokio::spawn(behaviour.run()),
    }
}

async fn shutdown(fixture: Fixture) {
    fixture.shared.shutdown();
    tokio::time::timeout(Duration::from_secs(60), fixture.worker)
        .await
        .expect("engine did not stop")
        .expect("engine panicked")
        .expect("engine failed");
}

#[tokio::test(start_paused = true)]
async fn happy_path_registers_node_then_device_then_heartbeats() {
    let http = ScriptedHttpClient::new();
    http.script_resource_statuses([201, 201]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let d1 = Id::new("d1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1), device_resource(&d1)],
    );

    wait_until_true(|| http.heartbeat_requests().len() >= 3).await;

    // node first, then the device, both against the fallback registry
    let resources = http.resource_requests();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].url, format!("{}/resource", FALLBACK_BASE));
    assert_eq!(resources[0].body.as_ref().unwrap()["type"], "node");
    assert_eq!(resources[0].body.as_ref().unwrap()["data"]["id"], "n1");
    assert_eq!(resources[1].body.as_ref().unwrap()["type"], "device");
    assert_eq!(resources[1].body.as_ref().unwrap()["data"]["id"], "d1");

    // heartbeats target the registered node on the configured interval
    let heartbeats = http.heartbeat_requests();
    assert!(heartbeats
        .iter()
        .all(|beat| beat.url == format!("{}/health/nodes/n1", FALLBACK_BASE)));
    for pair in heartbeats.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, Duration::from_secs(5));
    }

    assert_eq!(http.unscripted_resource_requests(), 0);
    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn stale_record_on_first_registration_is_cleared() {
    let http = ScriptedHttpClient::new();
    // 200 on the first node POST: DELETE, retry POST, then the device
    http.script_resource_statuses([200, 204, 201, 201]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let d1 = Id::new("d1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1), device_resource(&d1)],
    );

    wait_until_true(|| http.resource_requests().len() >= 4).await;

    let resources = http.resource_requests();
    assert_eq!(resources[0].method, HttpMethod::Post);
    assert_eq!(resources[0].body.as_ref().unwrap()["type"], "node");
    assert_eq!(resources[1].method, HttpMethod::Delete);
    assert_eq!(
        resources[1].url,
        format!("{}/resource/nodes/n1", FALLBACK_BASE)
    );
    assert_eq!(resources[2].method, HttpMethod::Post);
    assert_eq!(resources[2].body.as_ref().unwrap()["type"], "node");
    assert_eq!(resources[3].body.as_ref().unwrap()["type"], "device");

    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn failover_pops_registry_and_replays_the_event() {
    let http = ScriptedHttpClient::new();
    // node @ A succeeds, device @ A hits a 503, device replays @ B
    http.script_resource_statuses([201, 503, 201]);
    let browser =
        CannedBrowser::discovering(vec![service(10, "a.local"), service(20, "b.local")]);
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let d1 = Id::new("d1").unwrap();
    let fixture = spawn_engine(
        Settings::default(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1), device_resource(&d1)],
    );

    wait_until_true(|| http.resource_requests().len() >= 3).await;

    let a = "http://a.local:3210/x-nmos/registration/v1.2";
    let b = "http://b.local:3210/x-nmos/registration/v1.2";

    let resources = http.resource_requests();
    assert_eq!(resources[0].url, format!("{}/resource", a));
    assert_eq!(resources[0].body.as_ref().unwrap()["type"], "node");
    assert_eq!(resources[1].url, format!("{}/resource", a));
    assert_eq!(resources[1].body.as_ref().unwrap()["type"], "device");
    // the failed event was re-prepended, not lost
    assert_eq!(resources[2].url, format!("{}/resource", b));
    assert_eq!(resources[2].body.as_ref().unwrap()["type"], "device");

    // both registries were probed with a heartbeat on selection
    let heartbeats = http.heartbeat_requests();
    assert!(heartbeats.iter().any(|beat| beat.url.starts_with(a)));
    assert!(heartbeats.iter().any(|beat| beat.url.starts_with(b)));

    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_404_triggers_full_reregistration() {
    let http = ScriptedHttpClient::new();
    http.script_resource_statuses([201, 201, 201, 201]);
    // initial probe succeeds, the first background heartbeat finds the node
    // forgotten
    http.script_heartbeat_statuses([200, 404]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let d1 = Id::new("d1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1), device_resource(&d1)],
    );

    wait_until_true(|| http.resource_requests().len() >= 4).await;

    // the re-registration snapshot replays every resource, node first
    let resources = http.resource_requests();
    assert_eq!(resources[2].body.as_ref().unwrap()["type"], "node");
    assert_eq!(resources[3].body.as_ref().unwrap()["type"], "device");

    assert_eq!(http.unscripted_resource_requests(), 0);
    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn peer_to_peer_publishes_and_bumps_ver_records() {
    let http = ScriptedHttpClient::new();
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    // advertised node, nothing discoverable, no fallback configured
    let settings = Settings {
        pri: 10,
        ..Settings::default()
    };
    let fixture = spawn_engine(settings, http, browser, advertiser.clone(), Vec::new());

    wait_until_true(|| !advertiser.updates().is_empty()).await;

    let first = advertiser.updates()[0].clone();
    for key in [
        "ver_self",
        "ver_sources",
        "ver_flows",
        "ver_devices",
        "ver_senders",
        "ver_receivers",
    ] {
        assert!(
            first.contains(&(key.to_string(), "0".to_string())),
            "missing {}=0 in {:?}",
            key,
            first
        );
    }

    // adding a sender bumps ver_senders and republishes the records
    let s1 = Id::new("s1").unwrap();
    fixture
        .shared
        .with_write(|model| model.resources.insert(sender_resource(&s1)).unwrap());

    wait_until_true(|| {
        advertiser
            .updates()
            .iter()
            .any(|records| records.contains(&("ver_senders".to_string(), "1".to_string())))
    })
    .await;

    shutdown(fixture).await;

    // leaving peer-to-peer withdrew the ver_* records: the final update is
    // bit-exact the originally registered set
    let calls = advertiser.calls();
    assert_eq!(calls[0].0, "register");
    let registered = calls[0].1.clone();
    let last_update = advertiser.updates().last().cloned().unwrap();
    assert_eq!(last_update, registered);
    assert_eq!(calls.last().unwrap().0, "withdraw");
}

#[tokio::test(start_paused = true)]
async fn discovery_backoff_grows_exponentially_then_resets() {
    let http = ScriptedHttpClient::new();
    // five registration cycles fail with 5xx, the sixth succeeds; after the
    // registry later forgets the node, failures resume from the minimum
    http.script_resource_statuses([503, 503, 503, 503, 503, 201, 503, 503]);
    http.script_heartbeat_statuses([200, 404]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let settings = Settings {
        registry_address: Some("reg.local".into()),
        discovery_backoff_min_secs: 1.0,
        discovery_backoff_max_secs: 30.0,
        discovery_backoff_factor: 2.0,
        ..Settings::default()
    };

    let n1 = Id::new("n1").unwrap();
    let fixture = spawn_engine(
        settings,
        http.clone(),
        browser.clone(),
        advertiser,
        vec![node_resource(&n1)],
    );

    wait_until_true(|| browser.browse_count() >= 8).await;

    let instants = browser.browse_instants();
    let deltas: Vec<u64> = instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect();

    // waits of 0, 1, 2, 4, 8, 16 seconds ahead of the first six browses
    assert_eq!(&deltas[..5], &[1, 2, 4, 8, 16]);
    // after the successful registration the backoff resumed from the
    // minimum, not from where it left off
    assert_eq!(deltas[6], 1);

    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn lifecycle_produces_create_update_delete_in_order() {
    let http = ScriptedHttpClient::new();
    http.script_resource_statuses([201, 201, 200, 204]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1)],
    );

    // wait for registered operation
    wait_until_true(|| !http.heartbeat_requests().is_empty()).await;

    let d1 = Id::new("d1").unwrap();
    fixture
        .shared
        .with_write(|model| model.resources.insert(device_resource(&d1)).unwrap());
    fixture.shared.with_write(|model| {
        model
            .resources
            .modify(&d1, |resource| {
                resource.data["label"] = json!("renamed");
            })
            .unwrap()
    });
    fixture
        .shared
        .with_write(|model| model.resources.remove(&d1).unwrap());

    wait_until_true(|| http.resource_requests().len() >= 4).await;

    let resources = http.resource_requests();
    // exactly one create, one update, one delete for the device, in order
    assert_eq!(resources[1].method, HttpMethod::Post);
    assert_eq!(resources[1].body.as_ref().unwrap()["data"]["label"], "device");
    assert_eq!(resources[2].method, HttpMethod::Post);
    assert_eq!(
        resources[2].body.as_ref().unwrap()["data"]["label"],
        "renamed"
    );
    assert_eq!(resources[3].method, HttpMethod::Delete);
    assert_eq!(
        resources[3].url,
        format!("{}/resource/devices/d1", FALLBACK_BASE)
    );
    assert_eq!(http.unscripted_resource_requests(), 0);

    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn events_before_the_node_are_discarded_in_initial_registration() {
    let http = ScriptedHttpClient::new();
    http.script_resource_statuses([201]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    // only a device in the store: its snapshot event precedes any node
    let d1 = Id::new("d1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser.clone(),
        advertiser,
        vec![device_resource(&d1)],
    );

    // let the engine drain (and discard) the device-only snapshot first
    wait_until_true(|| browser.browse_count() >= 1).await;

    // the node arrives later; registration starts with it
    let n1 = Id::new("n1").unwrap();
    fixture
        .shared
        .with_write(|model| model.resources.insert(node_resource(&n1)).unwrap());

    wait_until_true(|| !http.resource_requests().is_empty()).await;

    let resources = http.resource_requests();
    assert_eq!(resources[0].body.as_ref().unwrap()["type"], "node");
    assert_eq!(http.unscripted_resource_requests(), 0);

    shutdown(fixture).await;
}

#[tokio::test(start_paused = true)]
async fn controlled_unregistration_stops_heartbeating() {
    let http = ScriptedHttpClient::new();
    // register the node, then delete it cleanly
    http.script_resource_statuses([201, 204]);
    let browser = CannedBrowser::empty();
    let advertiser = RecordingAdvertiser::new();

    let n1 = Id::new("n1").unwrap();
    let fixture = spawn_engine(
        fallback_settings(),
        http.clone(),
        browser,
        advertiser,
        vec![node_resource(&n1)],
    );

    wait_until_true(|| !http.heartbeat_requests().is_empty()).await;

    fixture
        .shared
        .with_write(|model| model.resources.remove(&n1).unwrap());

    wait_until_true(|| {
        http.resource_requests()
            .iter()
            .any(|request| request.method == HttpMethod::Delete)
    })
    .await;

    // heartbeating stops after the node deletes itself
    let count_after_delete = http.heartbeat_requests().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(http.heartbeat_requests().len(), count_after_delete);

    assert_eq!(http.unscripted_resource_requests(), 0);
    shutdown(fixture).await;
}
