//! Update stream tests

use parcel_tracker::app::{self, AppState};
use parcel_tracker::domain::package::{NewPackage, StatusUpdate};
use parcel_tracker::domain::types::{PackageStatus, TrackingCode};
use parcel_tracker::infra::Config;
use parcel_tracker::services::{StreamEnd, StreamMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn state(config: Config) -> Arc<AppState> {
    let (state, dispatcher) = app::build(&config.with_rng_seed(5), "test");
    tokio::spawn(dispatcher.run());
    state
}

async fn create(state: &AppState) -> TrackingCode {
    let request = NewPackage {
        recipient_name: "Marta Ríos".to_string(),
        recipient_address: "Diagonal 22 # 9-15".to_string(),
        recipient_phone: "+573154443322".to_string(),
        sender_name: "Almacén Sur".to_string(),
        sender_address: "Calle 13 # 50-60".to_string(),
    };
    state.lifecycle.create(request).await.unwrap().tracking_code
}

async fn drain(mut rx: mpsc::Receiver<StreamMessage>) -> Vec<StreamMessage> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        messages
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_terminal_package_completes_after_one_update() {
    let state = state(Config::default().with_stream_timing(10, 20, 30));
    let code = create(&state).await;
    for status in [
        PackageStatus::Warehouse,
        PackageStatus::InTransit,
        PackageStatus::OutForDistribution,
        PackageStatus::OutForDelivery,
        PackageStatus::Delivered,
    ] {
        let update = StatusUpdate {
            status,
            updated_by: "EMP001".to_string(),
            notes: None,
            location: None,
        };
        state.lifecycle.apply_status_change(&code, update).await.unwrap();
    }

    let messages = drain(state.streams.open(code.clone())).await;
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        StreamMessage::Update(snapshot) => {
            assert_eq!(snapshot.tracking_number, code);
            assert_eq!(snapshot.status, PackageStatus::Delivered);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(messages[1], StreamMessage::Completed(StreamEnd::Terminal));
}

#[tokio::test]
async fn test_missing_package_reports_error() {
    let state = state(Config::default().with_stream_timing(10, 20, 30));
    let messages = drain(state.streams.open(TrackingCode::from("TRK-GHOST000"))).await;

    assert_eq!(messages.len(), 1);
    assert!(matches!(&messages[0], StreamMessage::Error(reason) if reason.contains("TRK-GHOST000")));
}

#[tokio::test]
async fn test_cap_ends_stream() {
    let config = Config::default().with_sim_delays_ms(10_000, 10_000).with_stream_timing(10, 3, 30);
    let state = state(config);
    let code = create(&state).await;

    let messages = drain(state.streams.open(code.clone())).await;
    let updates = messages.iter().filter(|m| matches!(m, StreamMessage::Update(_))).count();
    assert_eq!(updates, 3);
    assert_eq!(messages.last(), Some(&StreamMessage::Completed(StreamEnd::CapReached)));

    // Opening the stream also started the simulator
    assert!(state.simulator.is_running(&code));
    state.simulator.shutdown().await;
}

#[tokio::test]
async fn test_timeout_ends_stream() {
    let config = Config::default().with_sim_delays_ms(10_000, 10_000).with_stream_timing(300, 100, 1);
    let state = state(config);
    let code = create(&state).await;

    let messages = drain(state.streams.open(code)).await;
    assert_eq!(messages.last(), Some(&StreamMessage::Completed(StreamEnd::TimedOut)));
    let updates = messages.iter().filter(|m| matches!(m, StreamMessage::Update(_))).count();
    assert!((2..=4).contains(&updates), "updates {updates}");
    state.simulator.shutdown().await;
}

#[tokio::test]
async fn test_dropped_receiver_stops_polling() {
    let config = Config::default().with_sim_delays_ms(10_000, 10_000).with_stream_timing(20, 1000, 60);
    let state = state(config);
    let code = create(&state).await;

    let mut rx = state.streams.open(code);
    assert!(matches!(rx.recv().await, Some(StreamMessage::Update(_))));
    assert_eq!(state.metrics.active_streams(), 1);
    drop(rx);

    tokio::time::timeout(Duration::from_secs(2), async {
        while state.metrics.active_streams() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    state.simulator.shutdown().await;
}
