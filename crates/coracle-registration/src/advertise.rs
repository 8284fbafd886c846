//! Node service advertisement
//!
//! The node advertises `_nmos-node._tcp` for its whole lifetime. While it is
//! registered the advertisement carries only the base TXT records; when it
//! is unable to locate or register with a Registration API it additionally
//! advertises the `ver_*` counters, and withdraws them again on leaving
//! peer-to-peer operation.
//!
//! A node configured with the unadvertised priority does not advertise at
//! all. The `pri` record itself is not carried on node advertisements.

use coracle_core::error::Result;
use coracle_core::settings::Settings;
use coracle_model::ApiResourceVersions;

/// A single TXT record
pub type TxtRecord = (String, String);

/// Publishes and maintains the node's DNS-SD advertisement
///
/// Implementations own host/port details; the engine only supplies TXT
/// records.
pub trait NodeAdvertiser: Send + Sync {
    /// Publish the `_nmos-node._tcp` service
    fn register(&self, records: &[TxtRecord]) -> Result<()>;

    /// Replace the TXT records of the published service
    fn update(&self, records: &[TxtRecord]) -> Result<()>;

    /// Remove the published service
    fn withdraw(&self) -> Result<()>;
}

/// The base TXT records of every node advertisement
pub fn make_txt_records() -> Vec<TxtRecord> {
    vec![
        ("api_proto".to_string(), "http".to_string()),
        ("api_ver".to_string(), "v1.2,v1.3".to_string()),
    ]
}

/// The peer-to-peer `ver_*` TXT records
pub fn make_ver_records(ver: &ApiResourceVersions) -> Vec<TxtRecord> {
    vec![
        ("ver_self".to_string(), ver.node.to_string()),
        ("ver_sources".to_string(), ver.sources.to_string()),
        ("ver_flows".to_string(), ver.flows.to_string()),
        ("ver_devices".to_string(), ver.devices.to_string()),
        ("ver_senders".to_string(), ver.senders.to_string()),
        ("ver_receivers".to_string(), ver.receivers.to_string()),
    ]
}

/// Register the node service unless the node is configured unadvertised
pub fn advertise_node_service(advertiser: &dyn NodeAdvertiser, settings: &Settings) -> Result<()> {
    if !settings.is_advertised() {
        return Ok(());
    }

    advertiser.register(&make_txt_records())
}

/// Update the advertisement with the current `ver_*` counters
///
/// Used on entering peer-to-peer operation and after each drained batch of
/// resource events.
pub fn update_node_service_with_versions(
    advertiser: &dyn NodeAdvertiser,
    settings: &Settings,
    ver: &ApiResourceVersions,
) -> Result<()> {
    if !settings.is_advertised() {
        return Ok(());
    }

    let mut records = make_txt_records();
    records.extend(make_ver_records(ver));
    advertiser.update(&records)
}

/// Restore the base advertisement, withdrawing the `ver_*` records
pub fn update_node_service(advertiser: &dyn NodeAdvertiser, settings: &Settings) -> Result<()> {
    if !settings.is_advertised() {
        return Ok(());
    }

    advertiser.update(&make_txt_records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAdvertiser {
        calls: Mutex<Vec<(String, Vec<TxtRecord>)>>,
    }

    impl NodeAdvertiser for RecordingAdvertiser {
        fn register(&self, records: &[TxtRecord]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(("register".into(), records.to_vec()));
            Ok(())
        }

        fn update(&self, records: &[TxtRecord]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(("update".into(), records.to_vec()));
            Ok(())
        }

        fn withdraw(&self) -> Result<()> {
            self.calls.lock().unwrap().push(("withdraw".into(), vec![]));
            Ok(())
        }
    }

    fn advertised_settings() -> Settings {
        Settings {
            pri: 10,
            ..Settings::default()
        }
    }

    #[test]
    fn test_base_records() {
        let records = make_txt_records();
        assert!(records.contains(&("api_proto".to_string(), "http".to_string())));
        assert!(records.iter().any(|(key, _)| key == "api_ver"));
        assert!(!records.iter().any(|(key, _)| key == "pri"));
    }

    #[test]
    fn test_ver_records_reflect_counters() {
        let mut ver = ApiResourceVersions::new();
        ver.senders = 3;

        let records = make_ver_records(&ver);
        assert!(records.contains(&("ver_senders".to_string(), "3".to_string())));
        assert!(records.contains(&("ver_self".to_string(), "0".to_string())));
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn test_unadvertised_node_stays_silent() {
        let advertiser = RecordingAdvertiser::default();
        let settings = Settings::default(); // pri == no_priority

        advertise_node_service(&advertiser, &settings).unwrap();
        update_node_service_with_versions(&advertiser, &settings, &ApiResourceVersions::new())
            .unwrap();
        update_node_service(&advertiser, &settings).unwrap();

        assert!(advertiser.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_enter_and_leave_peer_to_peer_round_trips() {
        let advertiser = RecordingAdvertiser::default();
        let settings = advertised_settings();

        advertise_node_service(&advertiser, &settings).unwrap();
        let registered = advertiser.calls.lock().unwrap().last().unwrap().1.clone();

        let mut ver = ApiResourceVersions::new();
        ver.devices = 1;
        update_node_service_with_versions(&advertiser, &settings, &ver).unwrap();

        let with_ver = advertiser.calls.lock().unwrap().last().unwrap().1.clone();
        assert!(with_ver.iter().any(|(key, _)| key == "ver_devices"));

        update_node_service(&advertiser, &settings).unwrap();
        let restored = advertiser.calls.lock().unwrap().last().unwrap().1.clone();

        // leaving peer-to-peer restores the record set bit-exact
        assert_eq!(restored, registered);
    }
}
