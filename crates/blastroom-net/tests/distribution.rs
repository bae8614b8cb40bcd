//! Distribution client behaviour against the in-process broker.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use blastroom_events::{Event, PlayerSnapshot};
use blastroom_net::{Broker, ClientSettings, DistributionClient, MemoryBroker, NetError};
use blastroom_types::{Grid, Position};

const REFRESH: Duration = Duration::from_secs(3);

fn settings(identity: &str) -> ClientSettings {
    ClientSettings {
        room: "lobby".to_owned(),
        identity: identity.to_owned(),
        grid: Grid::new(10, 10).unwrap(),
        density_ratio: 5,
        obstacle_refresh: REFRESH,
        outbound_capacity: 20,
        inbound_capacity: 64,
    }
}

async fn join(broker: &MemoryBroker, identity: &str) -> Result<DistributionClient, NetError> {
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    DistributionClient::connect(shared, settings(identity)).await
}

/// Wait for the first received event matching `wanted`.
async fn expect_event(client: &mut DistributionClient, wanted: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), client.recv())
            .await
            .unwrap()
            .unwrap();
        if wanted(&event) {
            return event;
        }
    }
}

fn join_event(name: &str) -> Event {
    Event::Join(PlayerSnapshot {
        name: name.to_owned(),
        attribute: "fff".to_owned(),
        position: Position::new(1, 2),
        alive: true,
    })
}

#[tokio::test(start_paused = true)]
async fn duplicate_identity_is_refused() {
    let broker = MemoryBroker::new();
    let _first = join(&broker, "ana").await.unwrap();
    let second = join(&broker, "ana").await;
    assert!(matches!(second, Err(NetError::DuplicateIdentity { .. })));
}

#[tokio::test(start_paused = true)]
async fn exactly_one_leader_under_concurrent_join() {
    let broker = MemoryBroker::new();
    let (a, b, c) = tokio::join!(join(&broker, "ana"), join(&broker, "bo"), join(&broker, "cy"));
    let clients = [a.unwrap(), b.unwrap(), c.unwrap()];
    tokio::time::sleep(Duration::from_millis(10)).await;

    let leaders = clients.iter().filter(|c| c.is_leader()).count();
    assert_eq!(leaders, 1);
    assert!(broker.holder("lobby.obstacle-leader").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn late_joiner_starts_from_retained_layout() {
    let broker = MemoryBroker::new();
    let mut leader = join(&broker, "ana").await.unwrap();
    let published = expect_event(&mut leader, |e| matches!(e, Event::ObstacleSnapshot { .. })).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut late = join(&broker, "bo").await.unwrap();
    let first = late.recv().await.unwrap();
    assert_eq!(first, published);
    assert!(!late.is_leader());
}

#[tokio::test(start_paused = true)]
async fn published_events_reach_every_peer_including_sender() {
    let broker = MemoryBroker::new();
    let mut ana = join(&broker, "ana").await.unwrap();
    let mut bo = join(&broker, "bo").await.unwrap();

    assert!(ana.publisher().submit(join_event("ana")));

    let is_join = |e: &Event| matches!(e, Event::Join(_));
    assert_eq!(expect_event(&mut bo, is_join).await, join_event("ana"));
    assert_eq!(expect_event(&mut ana, is_join).await, join_event("ana"));
}

#[tokio::test(start_paused = true)]
async fn undecodable_messages_are_acked_and_skipped() {
    let broker = MemoryBroker::new();
    let mut ana = join(&broker, "ana").await.unwrap();
    let before = broker.acked().await;

    broker.publish("lobby", b"{\"kind\":\"teleport\"}".to_vec()).await.unwrap();
    broker.publish("lobby", b"not json".to_vec()).await.unwrap();
    broker
        .publish("lobby", blastroom_events::encode(&join_event("bo")).unwrap())
        .await
        .unwrap();

    let event = expect_event(&mut ana, |e| matches!(e, Event::Join(_))).await;
    assert_eq!(event, join_event("bo"));
    assert!(broker.acked().await >= before.saturating_add(3));
}

#[tokio::test(start_paused = true)]
async fn drain_takes_only_what_is_queued() {
    let broker = MemoryBroker::new();
    let mut ana = join(&broker, "ana").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let _ = ana.drain_ready();

    for name in ["bo", "cy"] {
        broker
            .publish("lobby", blastroom_events::encode(&join_event(name)).unwrap())
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ana.pending(), 2);
    let drained = ana.drain_ready();
    assert_eq!(drained, vec![join_event("bo"), join_event("cy")]);
    assert_eq!(ana.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn leadership_moves_when_the_leader_leaves() {
    let broker = MemoryBroker::new();
    let ana = join(&broker, "ana").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ana.is_leader());

    let bo = join(&broker, "bo").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!bo.is_leader());

    ana.shutdown().await;
    tokio::time::sleep(REFRESH.saturating_add(Duration::from_millis(10))).await;
    assert!(bo.is_leader());
}

#[tokio::test(start_paused = true)]
async fn expired_leader_lease_is_taken_on_next_attempt() {
    let broker = MemoryBroker::new();
    let ana = join(&broker, "ana").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let bo = join(&broker, "bo").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // ana stops renewing
    drop(ana);
    broker.expire("lobby.obstacle-leader").await;
    tokio::time::sleep(REFRESH).await;
    assert!(bo.is_leader());
}

#[tokio::test(start_paused = true)]
async fn shutdown_frees_the_identity() {
    let broker = MemoryBroker::new();
    let ana = join(&broker, "ana").await.unwrap();
    ana.shutdown().await;
    assert!(broker.holder("lobby.identity.ana").await.is_none());
    let again = join(&broker, "ana").await;
    assert!(again.is_ok());
}

#[tokio::test(start_paused = true)]
async fn identity_taken_mid_session_is_reported_and_leadership_handed_over() {
    let broker = MemoryBroker::new();
    let first = join(&broker, "ana").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(first.is_leader());
    assert!(first.ensure_identity().is_ok());

    // the lease lapses and another process claims the same name
    broker.expire("lobby.identity.ana").await;
    let second = join(&broker, "ana").await.unwrap();
    tokio::time::sleep(REFRESH.saturating_add(Duration::from_millis(10))).await;

    assert!(matches!(
        first.ensure_identity(),
        Err(NetError::DuplicateIdentity { .. })
    ));
    assert!(!first.is_leader());
    assert!(second.ensure_identity().is_ok());
    assert!(second.is_leader());
    assert!(broker.holder("lobby.identity.ana").await.is_some());
}
