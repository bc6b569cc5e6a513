use output_route_selector::route::{DeviceType, EventNotifier, RouteEvent, reconcile};
use tokio::sync::mpsc;

mod test_utils;
use test_utils::SnapshotBuilder;

/// Active-route priority and candidate list invariants
#[cfg(test)]
mod priority_tests {
    use super::*;

    #[test]
    fn test_speaker_dominates_everything() {
        let snapshot = SnapshotBuilder::new()
            .speaker()
            .wired()
            .bluetooth_route()
            .active_bluetooth_device("AirPods Pro")
            .build();

        let result = reconcile(&snapshot);

        assert_eq!(result.active.device_type, DeviceType::Speaker);
    }

    #[test]
    fn test_wired_beats_bluetooth() {
        let snapshot = SnapshotBuilder::new()
            .wired()
            .bluetooth_route()
            .bluetooth_device("AirPods Pro")
            .build();

        let result = reconcile(&snapshot);

        assert_eq!(result.active.device_type, DeviceType::WiredHeadset);
        assert_eq!(result.active.title, "wiredHeadset");
    }

    #[test]
    fn test_bluetooth_route_picks_enumerated_device() {
        let snapshot = SnapshotBuilder::new()
            .bluetooth_route()
            .bluetooth_device("AirPods Pro")
            .build();

        let result = reconcile(&snapshot);

        assert_eq!(result.active.device_type, DeviceType::Bluetooth);
        assert_eq!(result.active.title, "AirPods Pro");
    }

    #[test]
    fn test_bluetooth_route_without_devices_falls_back_to_receiver() {
        let snapshot = SnapshotBuilder::new().bluetooth_route().build();

        let result = reconcile(&snapshot);

        assert_eq!(result.active.device_type, DeviceType::Receiver);
        assert!(
            result
                .candidates
                .iter()
                .all(|d| d.device_type != DeviceType::Bluetooth)
        );
    }

    #[test]
    fn test_nothing_routed_means_receiver() {
        let result = reconcile(&SnapshotBuilder::new().build());
        assert_eq!(result.active.device_type, DeviceType::Receiver);
    }

    #[test]
    fn test_receiver_listed_iff_telephony() {
        let with = reconcile(&SnapshotBuilder::new().build());
        let without = reconcile(&SnapshotBuilder::new().no_telephony().build());

        assert!(with.find(DeviceType::Receiver, None).is_some());
        assert!(without.find(DeviceType::Receiver, None).is_none());
        assert_eq!(without.active.device_type, DeviceType::Speaker);
    }

    #[test]
    fn test_duplicate_bluetooth_names_collapse() {
        let snapshot = SnapshotBuilder::new()
            .bluetooth_route()
            .bluetooth_device("AirPods Pro")
            .bluetooth_device("AirPods Pro")
            .bluetooth_device("Car Kit")
            .build();

        let result = reconcile(&snapshot);
        let bluetooth: Vec<&str> = result
            .candidates
            .iter()
            .filter(|d| d.device_type == DeviceType::Bluetooth)
            .map(|d| d.title.as_str())
            .collect();

        assert_eq!(bluetooth, vec!["AirPods Pro", "Car Kit"]);
    }

    #[test]
    fn test_speaker_always_listed_and_wired_only_when_connected() {
        let unplugged = reconcile(&SnapshotBuilder::new().build());
        let plugged = reconcile(&SnapshotBuilder::new().wired().build());

        assert!(unplugged.find(DeviceType::Speaker, None).is_some());
        assert!(unplugged.find(DeviceType::WiredHeadset, None).is_none());
        assert!(plugged.find(DeviceType::WiredHeadset, None).is_some());
    }

    #[test]
    fn test_exactly_one_active_across_states() {
        let states = vec![
            SnapshotBuilder::new().build(),
            SnapshotBuilder::new().no_telephony().build(),
            SnapshotBuilder::new().speaker().wired().build(),
            SnapshotBuilder::new().wired().bluetooth_route().build(),
            SnapshotBuilder::new().bluetooth_route().build(),
            SnapshotBuilder::new()
                .bluetooth_route()
                .bluetooth_device("A")
                .active_bluetooth_device("B")
                .build(),
            SnapshotBuilder::new()
                .no_telephony()
                .bluetooth_route()
                .build(),
        ];

        for snapshot in states {
            let result = reconcile(&snapshot);
            let active: Vec<_> = result.candidates.iter().filter(|d| d.is_active).collect();
            assert_eq!(active.len(), 1, "snapshot {:?}", snapshot);
            assert_eq!(active[0], &result.active);
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let snapshot = SnapshotBuilder::new()
            .wired()
            .bluetooth_device("AirPods Pro")
            .build();

        assert_eq!(reconcile(&snapshot), reconcile(&snapshot));
    }
}

/// Notifier deduplication over reconciled routes
#[cfg(test)]
mod notifier_tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<RouteEvent>) -> Vec<RouteEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_emits_once_per_distinct_reconciled_route() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = EventNotifier::new();
        notifier.attach(tx);

        let speaker = reconcile(&SnapshotBuilder::new().speaker().build()).active;
        let buds = reconcile(
            &SnapshotBuilder::new()
                .bluetooth_route()
                .bluetooth_device("Buds")
                .build(),
        )
        .active;
        let car = reconcile(
            &SnapshotBuilder::new()
                .bluetooth_route()
                .bluetooth_device("Car Kit")
                .build(),
        )
        .active;

        for device in [&speaker, &speaker, &buds, &buds, &car, &car, &speaker] {
            notifier.notify_if_changed(device, false);
        }

        let titles: Vec<String> = drain(&mut rx)
            .iter()
            .filter_map(|e| e.active_device().map(|d| d.title.clone()))
            .collect();
        assert_eq!(titles, vec!["speaker", "Buds", "Car Kit", "speaker"]);
    }
}
