//! Integration tests for the batch executor
//!
//! Tests running operations across a snapshot list, including:
//! - Partial failure: one device failing never affects the others
//! - Result order follows snapshot order
//! - Reset never talks to a handle after resetting it
//! - Display is read-only

use usbctl::error::ErrorKind;
use usbctl::executor::{BatchExecutor, Operation, OperationStatus};
use usbctl::test_utils::{
    FailPoint, FakeHost, SessionCall, create_mock_device, create_unconfigured_device,
};
use usbctl::usb::driver::KernelDriverControl;
use usbctl::usb::{DeviceLocation, DiscoveredDevice, SnapshotList};

fn devices(n: u8) -> Vec<DiscoveredDevice> {
    (1..=n)
        .map(|addr| create_mock_device(1, addr, 0x1001, addr as u16))
        .collect()
}

/// Snapshots in the same order as `devices`, so index k is device k
fn snapshots_in_order(devices: &[DiscoveredDevice]) -> SnapshotList {
    SnapshotList::capture_all(devices.iter().rev()).unwrap()
}

mod partial_failure {
    use super::*;

    fn run_with_failure(point: FailPoint, operation: Operation) {
        let n = 5;
        let k = 2;
        let devs = devices(n);
        let host = FakeHost::with_devices(devs.clone());
        host.fail_at(devs[k].location, point);
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);
        let snapshots = snapshots_in_order(&devs);

        let mut out = Vec::new();
        let report = executor.run(&snapshots, operation, &mut out);

        assert_eq!(report.results.len(), n as usize);
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.location, devs[i].location);
            if i == k {
                assert!(!result.is_success(), "device {} should fail", i);
            } else {
                assert!(result.is_success(), "device {} should succeed: {:?}", i, result);
            }
        }
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), n as usize - 1);
        assert_eq!(host.open_sessions(), 0);
        assert_eq!(host.open_count(), host.close_count());
    }

    #[test]
    fn test_claim_failure_status() {
        run_with_failure(FailPoint::Claim, Operation::Status);
    }

    #[test]
    fn test_open_failure_status() {
        run_with_failure(FailPoint::Open, Operation::Status);
    }

    #[test]
    fn test_transfer_failure_status() {
        run_with_failure(FailPoint::Transfer, Operation::Status);
    }

    #[test]
    fn test_claim_failure_reset() {
        run_with_failure(FailPoint::Claim, Operation::Reset);
    }

    #[test]
    fn test_reset_failure() {
        run_with_failure(FailPoint::Reset, Operation::Reset);
    }

    #[test]
    fn test_failure_kind_recorded() {
        let devs = devices(3);
        let host = FakeHost::with_devices(devs.clone());
        host.fail_at(devs[1].location, FailPoint::Claim);
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let report = executor.run(&snapshots_in_order(&devs), Operation::Status, &mut Vec::new());
        assert_eq!(report.results[1].failure_kind(), Some(ErrorKind::Claim));
        match &report.results[1].status {
            OperationStatus::Failed { message, .. } => assert!(message.contains("001/002")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_unconfigured_device_fails_alone() {
        let devs = vec![
            create_mock_device(1, 1, 0x1001, 1),
            create_unconfigured_device(1, 2, 0x1001, 2),
            create_mock_device(1, 3, 0x1001, 3),
        ];
        let host = FakeHost::with_devices(devs.clone());
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let report = executor.run(&snapshots_in_order(&devs), Operation::Status, &mut Vec::new());
        let kinds: Vec<_> = report.results.iter().map(|r| r.failure_kind()).collect();
        assert_eq!(kinds, vec![None, Some(ErrorKind::NoConfiguration), None]);
    }

    #[test]
    fn test_advisory_failures_do_not_fail_device() {
        let devs = devices(2);
        let host = FakeHost::with_devices(devs.clone());
        for dev in &devs {
            host.bind_kernel_driver(dev.location);
            host.fail_at(dev.location, FailPoint::Reattach);
            host.fail_at(dev.location, FailPoint::Release);
        }
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let report = executor.run(&snapshots_in_order(&devs), Operation::Status, &mut Vec::new());
        assert_eq!(report.succeeded(), 2);
    }
}

mod operations {
    use super::*;

    #[test]
    fn test_results_follow_snapshot_order() {
        let devs = devices(3);
        let host = FakeHost::with_devices(devs.clone());
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        // Head insertion: discovery order reversed
        let snapshots = SnapshotList::capture_all(devs.iter()).unwrap();
        let report = executor.run(&snapshots, Operation::Status, &mut Vec::new());

        let order: Vec<_> = report.results.iter().map(|r| r.location).collect();
        assert_eq!(
            order,
            vec![
                DeviceLocation::new(1, 3),
                DeviceLocation::new(1, 2),
                DeviceLocation::new(1, 1),
            ]
        );
    }

    #[test]
    fn test_devices_are_handled_strictly_in_sequence() {
        let devs = devices(3);
        let host = FakeHost::with_devices(devs.clone());
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        executor.run(&snapshots_in_order(&devs), Operation::Status, &mut Vec::new());

        // Every device's calls end with Close before the next device opens
        let calls = host.calls();
        let mut current: Option<DeviceLocation> = None;
        for (location, call) in calls {
            match call {
                SessionCall::Open => {
                    assert!(current.is_none(), "{} opened while {:?} in use", location, current);
                    current = Some(location);
                }
                SessionCall::Close => {
                    assert_eq!(current, Some(location));
                    current = None;
                }
                _ => assert_eq!(current, Some(location)),
            }
        }
        assert!(current.is_none());
    }

    #[test]
    fn test_reset_batch() {
        let devs = devices(3);
        let host = FakeHost::with_devices(devs.clone());
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let mut out = Vec::new();
        let report = executor.run(&snapshots_in_order(&devs), Operation::Reset, &mut out);

        assert_eq!(report.succeeded(), 3);
        assert!(host.post_reset_calls().is_empty());
        for dev in &devs {
            let calls = host.calls_for(dev.location);
            assert!(calls.contains(&SessionCall::Reset));
            // Nothing between the reset and the close
            let reset_at = calls.iter().position(|c| *c == SessionCall::Reset).unwrap();
            assert_eq!(&calls[reset_at + 1..], &[SessionCall::Close]);
        }

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Resetting!").count(), 3);
    }

    #[test]
    fn test_display_is_read_only() {
        let devs = devices(2);
        let host = FakeHost::with_devices(devs.clone());
        host.set_string(devs[0].location, 1, "Acme");
        host.set_string(devs[0].location, 2, "Widget");
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let mut out = Vec::new();
        let report = executor.run(&snapshots_in_order(&devs), Operation::Display, &mut out);

        assert_eq!(report.succeeded(), 2);
        for (_, call) in host.calls() {
            assert!(
                !matches!(
                    call,
                    SessionCall::ClaimInterface(_)
                        | SessionCall::DetachKernelDriver(_)
                        | SessionCall::KernelDriverActive(_)
                        | SessionCall::Reset
                        | SessionCall::WriteControl { .. }
                ),
                "display issued {:?}",
                call
            );
        }
        assert_eq!(host.open_sessions(), 0);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Bus: 001 Device: 001 Dev#1 [1001/0001] Acme :: Widget"));
        assert!(text.contains("Bus: 001 Device: 002 Dev#2 [1001/0002]"));
    }

    #[test]
    fn test_display_survives_open_failure() {
        let devs = devices(1);
        let host = FakeHost::with_devices(devs.clone());
        host.fail_at(devs[0].location, FailPoint::Open);
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 1);

        let mut out = Vec::new();
        let report = executor.run(&snapshots_in_order(&devs), Operation::Display, &mut out);

        assert!(report.results[0].is_success());
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Bus: 001 Device: 001 Dev#1 [1001/0001]\n"));
        assert!(text.contains("bInterfaceNumber:   0"));
    }

    #[test]
    fn test_empty_batch() {
        let host = FakeHost::new();
        let drivers = KernelDriverControl;
        let executor = BatchExecutor::new(&host, &drivers, 0);

        let report = executor.run(&SnapshotList::new(), Operation::Reset, &mut Vec::new());
        assert!(report.results.is_empty());
        assert!(host.calls().is_empty());
    }
}
