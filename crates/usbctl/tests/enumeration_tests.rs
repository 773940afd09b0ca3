//! Integration tests for enumeration and snapshots
//!
//! - Filter matching with zero as a wildcard
//! - Topology refresh and lookup by location
//! - Snapshot lists built by head insertion and isolated from the bus

use proptest::prelude::*;
use usbctl::error::ErrorKind;
use usbctl::test_utils::{FakeHost, create_mock_device};
use usbctl::usb::{DeviceFilter, DeviceLocation, DeviceSnapshot, SnapshotList, Topology};

mod topology {
    use super::*;

    #[test]
    fn test_refresh_groups_by_bus() {
        let host = FakeHost::with_devices([
            create_mock_device(2, 5, 0x1111, 1),
            create_mock_device(1, 2, 0x2222, 1),
            create_mock_device(2, 7, 0x3333, 1),
        ]);
        let mut topology = Topology::new();
        assert!(!topology.is_refreshed());

        assert_eq!(topology.refresh(&host).unwrap(), 3);
        assert!(topology.is_refreshed());

        let buses: Vec<_> = topology.buses().iter().map(|b| b.dirname()).collect();
        assert_eq!(buses, vec!["002", "001"]);
        assert_eq!(topology.buses()[0].devices.len(), 2);

        let order: Vec<_> = topology.devices().map(|d| d.location).collect();
        assert_eq!(
            order,
            vec![
                DeviceLocation::new(2, 5),
                DeviceLocation::new(2, 7),
                DeviceLocation::new(1, 2),
            ]
        );
    }

    #[test]
    fn test_refresh_replaces_previous_view() {
        let host = FakeHost::with_devices([create_mock_device(1, 2, 0x1111, 1)]);
        let mut topology = Topology::new();
        topology.refresh(&host).unwrap();

        host.replace_devices(vec![create_mock_device(3, 4, 0x2222, 1)]);
        topology.refresh(&host).unwrap();

        assert!(topology.locate(DeviceLocation::new(1, 2)).is_err());
        assert!(topology.locate(DeviceLocation::new(3, 4)).is_ok());
    }

    #[test]
    fn test_locate() {
        let host = FakeHost::with_devices([
            create_mock_device(1, 2, 0x1111, 1),
            create_mock_device(1, 3, 0x2222, 2),
        ]);
        let mut topology = Topology::new();
        topology.refresh(&host).unwrap();

        let found = topology.locate(DeviceLocation::new(1, 3)).unwrap();
        assert_eq!(found.descriptor.vendor_id, 0x2222);

        let found = topology.locate_path("/proc/bus/usb/001/002").unwrap();
        assert_eq!(found.descriptor.vendor_id, 0x1111);

        let err = topology.locate(DeviceLocation::new(9, 9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("009/009"));

        let err = topology.locate_path("nonsense").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocation);
    }

    #[test]
    fn test_discovery_failure() {
        let host = FakeHost::new();
        host.fail_discovery();
        let mut topology = Topology::new();

        let err = topology.refresh(&host).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Host);
        assert!(!topology.is_refreshed());
    }
}

mod snapshots {
    use super::*;

    #[test]
    fn test_prepend_order() {
        let a = DeviceSnapshot::capture(&create_mock_device(1, 1, 0xAAAA, 1)).unwrap();
        let b = DeviceSnapshot::capture(&create_mock_device(1, 2, 0xBBBB, 1)).unwrap();

        let mut list = SnapshotList::new();
        list.prepend(a).unwrap();
        list.prepend(b).unwrap();

        let vendors: Vec<_> = list.iter().map(|s| s.vendor_id()).collect();
        assert_eq!(vendors, vec![0xBBBB, 0xAAAA]);
        assert_eq!(list.prior(1).map(|s| s.vendor_id()), Some(0xBBBB));
        assert!(list.prior(0).is_none());
    }

    #[test]
    fn test_snapshots_outlive_bus_changes() {
        let host = FakeHost::with_devices([
            create_mock_device(1, 2, 0x1001, 1),
            create_mock_device(1, 3, 0x1001, 2),
        ]);
        let mut topology = Topology::new();
        topology.refresh(&host).unwrap();
        let matches = topology.matching(DeviceFilter::new(0x1001, 0));
        let mut list = SnapshotList::capture_all(matches).unwrap();

        host.replace_devices(Vec::new());
        topology.refresh(&host).unwrap();
        assert_eq!(topology.devices().count(), 0);

        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().location, DeviceLocation::new(1, 3));
        assert_eq!(list.get(0).unwrap().product_id(), 2);

        list.release_all();
        assert!(list.is_empty());
    }

    #[test]
    fn test_matching_can_be_walked_twice() {
        let host = FakeHost::with_devices([
            create_mock_device(1, 2, 0x1001, 1),
            create_mock_device(1, 3, 0x2002, 2),
        ]);
        let mut topology = Topology::new();
        topology.refresh(&host).unwrap();

        let matches = topology.matching(DeviceFilter::new(0x1001, 0));
        assert_eq!(matches.clone().count(), 1);
        let list = SnapshotList::capture_all(matches).unwrap();
        assert_eq!(list.len(), 1);
    }
}

mod proptests {
    use super::*;

    /// Strategy for a small bus of devices with distinct locations
    fn bus_strategy() -> impl Strategy<Value = Vec<(u16, u16)>> {
        proptest::collection::vec((0u16..4, 0u16..4), 0..=24)
    }

    fn host_for(ids: &[(u16, u16)]) -> FakeHost {
        FakeHost::with_devices(ids.iter().enumerate().map(|(i, &(vid, pid))| {
            create_mock_device(1 + (i / 8) as u8, 1 + (i % 8) as u8, vid, pid)
        }))
    }

    proptest! {
        /// Property: zero matches anything, otherwise equality is required
        #[test]
        fn prop_filter_wildcards(
            fv in 0u16..4, fp in 0u16..4, dv in 0u16..4, dp in 0u16..4,
        ) {
            let filter = DeviceFilter::new(fv, fp);
            let expected = (fv == 0 || fv == dv) && (fp == 0 || fp == dp);
            prop_assert_eq!(filter.matches(dv, dp), expected);
        }

        /// Property: the snapshot list is exactly the matches, reversed
        #[test]
        fn prop_snapshots_are_reversed_matches(
            ids in bus_strategy(), fv in 0u16..4, fp in 0u16..4,
        ) {
            let host = host_for(&ids);
            let mut topology = Topology::new();
            topology.refresh(&host).unwrap();
            let filter = DeviceFilter::new(fv, fp);

            let mut expected: Vec<DeviceLocation> =
                topology.matching(filter).map(|d| d.location).collect();
            expected.reverse();

            let list = SnapshotList::capture_all(topology.matching(filter)).unwrap();
            let actual: Vec<DeviceLocation> = list.iter().map(|s| s.location).collect();
            prop_assert_eq!(actual, expected);

            for snapshot in &list {
                prop_assert!(filter.matches(snapshot.vendor_id(), snapshot.product_id()));
            }
        }

        /// Property: the wildcard filter selects every device
        #[test]
        fn prop_any_selects_all(ids in bus_strategy()) {
            let host = host_for(&ids);
            let mut topology = Topology::new();
            topology.refresh(&host).unwrap();
            prop_assert_eq!(topology.matching(DeviceFilter::ANY).count(), ids.len());
        }
    }
}
