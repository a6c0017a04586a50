use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dronelink::{
    DEFAULT_SCAN_WINDOW, ErrorClass, FakeArgs, FakeCallLog, HardwareClient, LinkController,
    LinkError, LinkUpdate, Notice, PeerStore, PeripheralIdentity, Permission, PreconditionFailure,
    ScanFailure, ScanId, ScanStopReason, ScanStrategy, TransportCall, TransportEvent,
};

async fn controller_for(
    fake: FakeArgs,
) -> anyhow::Result<(LinkController, mpsc::UnboundedReceiver<LinkUpdate>)> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = dronelink::fake_hardware_client(fake).open(events_tx).await?;
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let controller = LinkController::new(
        transport,
        events_rx,
        PeerStore::in_memory(),
        updates_tx,
        DEFAULT_SCAN_WINDOW,
    );
    Ok((controller, updates_rx))
}

fn drain(updates: &mut mpsc::UnboundedReceiver<LinkUpdate>) -> Vec<LinkUpdate> {
    std::iter::from_fn(|| updates.try_recv().ok()).collect()
}

fn addresses(devices: &[PeripheralIdentity]) -> Vec<&str> {
    devices.iter().map(PeripheralIdentity::address).collect()
}

fn scan_strategies(calls: &FakeCallLog) -> Vec<ScanStrategy> {
    calls
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::StartScan { strategy } => Some(strategy),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn second_start_only_reports_already_scanning() -> anyhow::Result<()> {
    let calls = FakeCallLog::default();
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .call_log(calls.clone())
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.start_scan().await?;

    assert!(controller.scan().is_scanning());
    assert_eq!(
        vec![
            LinkUpdate::ScanStarted {
                strategy: ScanStrategy::Modern
            },
            LinkUpdate::Notice {
                notice: Notice::AlreadyScanning
            },
        ],
        drain(&mut updates)
    );
    assert_eq!(vec![ScanStrategy::Modern], scan_strategies(&calls));

    Ok(())
}

#[tokio::test]
async fn repeated_sightings_are_recorded_once() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43;CC:DD|-|-;AA:BB|drone|-40")?
        .build();
    let (mut controller, _updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    assert_eq!(3, controller.process_pending_events().await);

    let snapshot = controller.scan().snapshot();
    assert_eq!(vec!["AA:BB", "CC:DD"], addresses(&snapshot));
    assert_eq!(Some(-43), snapshot[0].rssi());

    Ok(())
}

#[tokio::test]
async fn discoveries_from_other_scans_are_ignored() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA:BB|drone|-43")?.build();
    let (mut controller, _updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller
        .handle_event(TransportEvent::Discovered {
            scan: ScanId::from(99),
            identity: PeripheralIdentity::new("EE:FF", None),
        })
        .await;
    controller.process_pending_events().await;

    assert_eq!(vec!["AA:BB"], addresses(&controller.scan().snapshot()));

    Ok(())
}

#[tokio::test]
async fn restarting_clears_previous_window() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA:BB|drone|-43")?.build();
    let (mut controller, _updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller
        .handle_event(TransportEvent::Discovered {
            scan: ScanId::from(1),
            identity: PeripheralIdentity::new("EE:FF", None),
        })
        .await;
    controller.stop_scan().await;
    controller.start_scan().await?;
    controller.process_pending_events().await;

    assert_eq!(vec!["AA:BB"], addresses(&controller.scan().snapshot()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_window_still_closes_with_a_selection_point() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("")?.build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    assert_eq!(0, controller.process_pending_events().await);
    assert_eq!(None, controller.poll_deadline().await);

    tokio::time::advance(DEFAULT_SCAN_WINDOW).await;

    assert_eq!(Some(Vec::new()), controller.poll_deadline().await);
    assert!(!controller.scan().is_scanning());
    assert_eq!(
        vec![
            LinkUpdate::ScanStarted {
                strategy: ScanStrategy::Modern
            },
            LinkUpdate::ScanStopped {
                reason: ScanStopReason::WindowElapsed,
                devices: Vec::new(),
            },
        ],
        drain(&mut updates)
    );

    Ok(())
}

#[tokio::test]
async fn cancelled_scan_reports_snapshot_without_selection() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA:BB|drone|-43")?.build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.process_pending_events().await;
    drain(&mut updates);
    controller.stop_scan().await;
    controller.stop_scan().await;

    assert_eq!(
        vec![LinkUpdate::ScanStopped {
            reason: ScanStopReason::Cancelled,
            devices: vec![PeripheralIdentity::new("AA:BB", None)],
        }],
        drain(&mut updates)
    );
    assert_eq!(None, controller.poll_deadline().await);

    Ok(())
}

#[tokio::test]
async fn registration_failure_pins_legacy_scanning() -> anyhow::Result<()> {
    let calls = FakeCallLog::default();
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .scan_failures("2")?
        .call_log(calls.clone())
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.process_pending_events().await;

    assert!(!controller.scan().is_scanning());
    assert_eq!(ScanStrategy::Legacy, controller.scan().strategy());

    controller.start_scan().await?;
    controller.process_pending_events().await;
    controller.stop_scan().await;
    controller.start_scan().await?;

    assert_eq!(
        vec![
            ScanStrategy::Modern,
            ScanStrategy::Legacy,
            ScanStrategy::Legacy
        ],
        scan_strategies(&calls)
    );
    let updates = drain(&mut updates);
    assert_eq!(
        &[
            LinkUpdate::ScanStarted {
                strategy: ScanStrategy::Modern
            },
            LinkUpdate::Notice {
                notice: Notice::LegacyScanFallback
            },
            LinkUpdate::ScanStarted {
                strategy: ScanStrategy::Legacy
            },
        ],
        &updates[..3]
    );

    Ok(())
}

#[tokio::test]
async fn legacy_registration_failure_is_reported_and_stays_legacy() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .scan_failures("2,2")?
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.process_pending_events().await;
    drain(&mut updates);
    controller.start_scan().await?;
    controller.process_pending_events().await;

    assert_eq!(ScanStrategy::Legacy, controller.scan().strategy());
    let failure = drain(&mut updates).into_iter().find_map(|update| match update {
        LinkUpdate::Failure { failure } => Some(failure),
        _ => None,
    });
    assert_eq!(Some(ErrorClass::Transport), failure.map(|failure| failure.class()));

    Ok(())
}

#[tokio::test]
async fn other_scan_failures_keep_modern_scanning() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .scan_failures("3")?
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.process_pending_events().await;

    assert!(!controller.scan().is_scanning());
    assert_eq!(ScanStrategy::Modern, controller.scan().strategy());
    assert_matches!(
        drain(&mut updates).last(),
        Some(LinkUpdate::Failure { failure }) if failure.class() == ErrorClass::Transport
    );

    Ok(())
}

#[tokio::test]
async fn failure_from_a_previous_scan_is_ignored() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA:BB|drone|-43")?.build();
    let (mut controller, _updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller
        .handle_event(TransportEvent::ScanFailed {
            scan: ScanId::from(7),
            failure: ScanFailure::RegistrationFailed,
        })
        .await;

    assert!(controller.scan().is_scanning());
    assert_eq!(ScanStrategy::Modern, controller.scan().strategy());

    Ok(())
}

#[tokio::test]
async fn radio_off_fails_before_scanning() -> anyhow::Result<()> {
    let calls = FakeCallLog::default();
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .radio_off(true)
        .call_log(calls.clone())
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    let result = controller.start_scan().await;

    assert_matches!(
        result,
        Err(LinkError::Precondition(PreconditionFailure::RadioDisabled))
    );
    assert!(!controller.scan().is_scanning());
    assert!(scan_strategies(&calls).is_empty());
    assert_matches!(
        drain(&mut updates).as_slice(),
        [LinkUpdate::Failure { failure }] if failure.class() == ErrorClass::Precondition
    );

    Ok(())
}

#[tokio::test]
async fn legacy_scanning_requires_location_permission() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .scan_failures("2")?
        .denied_permissions(vec![Permission::Location])
        .build();
    let (mut controller, _updates) = controller_for(fake).await?;

    controller.start_scan().await?;
    controller.process_pending_events().await;
    let result = controller.start_scan().await;

    assert_matches!(
        result,
        Err(LinkError::Precondition(PreconditionFailure::PermissionMissing {
            permission: Permission::Location
        }))
    );

    Ok(())
}

#[tokio::test]
async fn platform_without_scanning_fails_before_scanning() -> anyhow::Result<()> {
    let calls = FakeCallLog::default();
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .scan_unsupported(true)
        .call_log(calls.clone())
        .build();
    let (mut controller, mut updates) = controller_for(fake).await?;

    let result = controller.start_scan().await;

    assert_matches!(
        result,
        Err(LinkError::Precondition(PreconditionFailure::ScanUnsupported))
    );
    assert!(!controller.scan().is_scanning());
    assert!(scan_strategies(&calls).is_empty());
    assert_matches!(
        drain(&mut updates).as_slice(),
        [LinkUpdate::Failure { failure }] if failure.class() == ErrorClass::Precondition
    );

    Ok(())
}

#[tokio::test]
async fn modern_scanning_requires_scan_permission() -> anyhow::Result<()> {
    let calls = FakeCallLog::default();
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43")?
        .denied_permissions(vec![Permission::Scan])
        .call_log(calls.clone())
        .build();
    let (mut controller, _updates) = controller_for(fake).await?;

    let result = controller.start_scan().await;

    assert_matches!(
        result,
        Err(LinkError::Precondition(PreconditionFailure::PermissionMissing {
            permission: Permission::Scan
        }))
    );
    assert!(!controller.scan().is_scanning());
    assert_eq!(ScanStrategy::Modern, controller.scan().strategy());
    assert!(scan_strategies(&calls).is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_loop_closes_window_at_deadline() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA:BB|drone|-43;CC:DD|-|-")?
        .build();
    let (controller, mut updates) = controller_for(fake).await?;
    let handle = controller.handle();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(controller.run(cancel.clone()));

    handle.start_scan().await?;
    let devices = loop {
        match updates.recv().await {
            Some(LinkUpdate::ScanStopped {
                reason: ScanStopReason::WindowElapsed,
                devices,
            }) => break devices,
            Some(_) => {}
            None => anyhow::bail!("controller stopped before the window elapsed"),
        }
    };
    assert_eq!(vec!["AA:BB", "CC:DD"], addresses(&devices));

    cancel.cancel();
    task.await?;
    assert_matches!(handle.start_scan().await, Err(LinkError::ControllerClosed));

    Ok(())
}
