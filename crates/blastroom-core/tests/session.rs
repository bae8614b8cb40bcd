//! Multi-peer session behaviour over the in-process broker.
//!
//! Every test runs on a paused clock, so fuses, flame decay, and push
//! animations advance exactly as far as the frames the test drives.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use blastroom_core::config::{GridConfig, ObstacleConfig, QueueConfig, TimingConfig};
use blastroom_core::{FrameIntent, RoomConfig, SPAWN, Session, SessionError, TickReport};
use blastroom_events::{BombRef, Event, PlayerSnapshot, encode};
use blastroom_net::{Broker, MemoryBroker, NetError};
use blastroom_types::{Direction, Position};

const FRAME: Duration = Duration::from_millis(16);

fn config(player: &str) -> RoomConfig {
    RoomConfig {
        player: player.to_owned(),
        grid: GridConfig {
            width: 20,
            height: 15,
            blast_length: 3,
        },
        // no obstacles unless a test publishes a layout itself
        obstacles: ObstacleConfig {
            density_ratio: 100_000,
        },
        timing: TimingConfig {
            random_bomb_ms: 0,
            ..TimingConfig::default()
        },
        ..RoomConfig::default()
    }
}

async fn start(broker: &MemoryBroker, config: &RoomConfig) -> Session {
    Session::start(Arc::new(broker.clone()), config).await.unwrap()
}

/// Run idle frames on every session for `duration`. Returns, per session,
/// whether its local player died at any point.
async fn idle(sessions: &mut [&mut Session], duration: Duration) -> Vec<bool> {
    let mut died = vec![false; sessions.len()];
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        tokio::time::sleep(FRAME).await;
        elapsed = elapsed.saturating_add(FRAME);
        for (session, died) in sessions.iter_mut().zip(died.iter_mut()) {
            *died |= session.tick(FrameIntent::IDLE).local_died;
        }
    }
    died
}

async fn act(session: &mut Session, intent: FrameIntent) -> TickReport {
    tokio::time::sleep(FRAME).await;
    session.tick(intent)
}

/// Step once and wait for the echo.
async fn walk(session: &mut Session, direction: Direction) {
    act(session, FrameIntent::step(direction)).await;
    idle(&mut [session], Duration::from_millis(48)).await;
}

async fn place_bomb(session: &mut Session) {
    act(
        session,
        FrameIntent {
            place_bomb: true,
            ..FrameIntent::IDLE
        },
    )
    .await;
    idle(&mut [session], Duration::from_millis(48)).await;
}

async fn inject(broker: &MemoryBroker, channel: &str, event: &Event) {
    broker.publish(channel, encode(event).unwrap()).await.unwrap();
}

fn position(session: &Session) -> Position {
    session.local_player().unwrap().position
}

fn alive(session: &Session) -> bool {
    session.local_player().unwrap().alive
}

#[tokio::test(start_paused = true)]
async fn local_player_exists_from_the_first_frame() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    assert_eq!(position(&ana), SPAWN);
    assert!(alive(&ana));

    idle(&mut [&mut ana], Duration::from_millis(100)).await;
    assert_eq!(ana.room().players().count(), 1);
    assert!(ana.is_leader());
}

#[tokio::test(start_paused = true)]
async fn peers_discover_each_other() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    let mut bo = start(&broker, &config("bo")).await;

    idle(&mut [&mut ana, &mut bo], Duration::from_millis(200)).await;
    assert!(ana.room().player("bo").is_some());
    assert!(bo.room().player("ana").is_some());
}

#[tokio::test(start_paused = true)]
async fn duplicate_identity_fails_fast() {
    let broker = MemoryBroker::new();
    let _ana = start(&broker, &config("ana")).await;
    let second = Session::start(Arc::new(broker.clone()), &config("ana")).await;
    assert!(matches!(
        second,
        Err(SessionError::Net(NetError::DuplicateIdentity { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_frees_the_identity() {
    let broker = MemoryBroker::new();
    let ana = start(&broker, &config("ana")).await;
    ana.shutdown().await;
    let again = Session::start(Arc::new(broker.clone()), &config("ana")).await;
    assert!(again.is_ok());
}

#[tokio::test(start_paused = true)]
async fn moves_take_effect_on_echo() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    let mut bo = start(&broker, &config("bo")).await;
    idle(&mut [&mut ana, &mut bo], Duration::from_millis(100)).await;

    act(&mut ana, FrameIntent::step(Direction::Right)).await;
    assert_eq!(position(&ana), SPAWN);

    idle(&mut [&mut ana, &mut bo], Duration::from_millis(50)).await;
    assert_eq!(position(&ana), Position::new(1, 0));
    assert_eq!(bo.room().player("ana").unwrap().position, Position::new(1, 0));
}

#[tokio::test(start_paused = true)]
async fn moves_stop_at_the_border_and_at_obstacles() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;

    walk(&mut ana, Direction::Left).await;
    assert_eq!(position(&ana), SPAWN);

    // (1, 0) is index 1 on a 20-wide grid
    inject(&broker, "lobby-obstacle", &Event::ObstacleSnapshot { cells: vec![1] }).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    assert!(ana.room().is_obstacle(Position::new(1, 0)));

    walk(&mut ana, Direction::Right).await;
    assert_eq!(position(&ana), SPAWN);
    walk(&mut ana, Direction::Down).await;
    assert_eq!(position(&ana), Position::new(0, 1));
}

#[tokio::test(start_paused = true)]
async fn fuse_explodes_and_flames_decay_on_every_peer() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    let mut bo = start(&broker, &config("bo")).await;
    idle(&mut [&mut ana, &mut bo], Duration::from_millis(100)).await;

    place_bomb(&mut ana).await;
    idle(&mut [&mut ana, &mut bo], Duration::from_millis(50)).await;
    assert_eq!(ana.room().bomb_at(SPAWN).map(|b| b.owner()), Some("ana"));
    assert!(bo.room().bomb_at(SPAWN).is_some());

    let died = idle(&mut [&mut ana, &mut bo], Duration::from_millis(2200)).await;
    assert_eq!(died, vec![true, true]);
    for peer in [&ana, &bo] {
        assert_eq!(peer.room().bombs().count(), 0);
        assert_eq!(peer.room().blast_level(SPAWN), 1);
        assert_eq!(peer.room().blast_level(Position::new(3, 0)), 1);
        assert_eq!(peer.room().blast_level(Position::new(4, 0)), 0);
        assert!(!peer.room().player("ana").unwrap().alive);
        assert!(!peer.room().player("bo").unwrap().alive);
    }

    idle(&mut [&mut ana, &mut bo], Duration::from_millis(2100)).await;
    assert_eq!(ana.room().flames().count(), 0);
    assert_eq!(bo.room().flames().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn standing_in_flames_kills_and_revive_restores() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    for _ in 0..5 {
        walk(&mut ana, Direction::Right).await;
    }
    assert_eq!(position(&ana), Position::new(5, 0));

    // a stranger's bomb at (1, 0) reaches (4, 0) but not (5, 0)
    let bomb = BombRef {
        name: "zed-aaaaa".to_owned(),
        position: Position::new(1, 0),
    };
    inject(&broker, "lobby", &Event::PlaceBomb(bomb.clone())).await;
    inject(&broker, "lobby", &Event::Explode(bomb)).await;
    let died = idle(&mut [&mut ana], Duration::from_millis(50)).await;
    assert_eq!(died, vec![false]);
    assert!(alive(&ana));

    act(&mut ana, FrameIntent::step(Direction::Left)).await;
    let died = idle(&mut [&mut ana], Duration::from_millis(64)).await;
    assert_eq!(died, vec![true]);
    assert_eq!(position(&ana), Position::new(4, 0));
    assert!(!alive(&ana));

    // dead players cannot move
    walk(&mut ana, Direction::Left).await;
    assert_eq!(position(&ana), Position::new(4, 0));

    // wait out the flames, then come back
    idle(&mut [&mut ana], Duration::from_millis(2100)).await;
    assert_eq!(ana.room().blast_level(Position::new(4, 0)), 0);
    act(
        &mut ana,
        FrameIntent {
            revive: true,
            ..FrameIntent::IDLE
        },
    )
    .await;
    let died = idle(&mut [&mut ana], Duration::from_millis(64)).await;
    assert_eq!(died, vec![false]);
    assert!(alive(&ana));
    assert_eq!(position(&ana), Position::new(4, 0));
}

fn long_fuse(player: &str) -> RoomConfig {
    let mut config = config(player);
    config.timing.fuse_ms = 10_000;
    config
}

#[tokio::test(start_paused = true)]
async fn pushed_bomb_slides_for_the_configured_steps() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &long_fuse("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;

    walk(&mut ana, Direction::Right).await;
    walk(&mut ana, Direction::Right).await;
    place_bomb(&mut ana).await;
    assert!(ana.room().bomb_at(Position::new(2, 0)).is_some());

    walk(&mut ana, Direction::Left).await;
    walk(&mut ana, Direction::Right).await;
    assert_eq!(position(&ana), Position::new(2, 0));

    idle(&mut [&mut ana], Duration::from_millis(4600)).await;
    let bomb = ana.room().bombs().next().unwrap();
    assert_eq!(bomb.position, Position::new(10, 0));
    assert_eq!(ana.room().bombs().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn push_stops_before_an_obstacle() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &long_fuse("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;

    // obstacle at (6, 0)
    inject(&broker, "lobby-obstacle", &Event::ObstacleSnapshot { cells: vec![6] }).await;
    walk(&mut ana, Direction::Right).await;
    walk(&mut ana, Direction::Right).await;
    place_bomb(&mut ana).await;
    walk(&mut ana, Direction::Left).await;
    walk(&mut ana, Direction::Right).await;

    idle(&mut [&mut ana], Duration::from_millis(4600)).await;
    assert!(ana.room().bomb_at(Position::new(5, 0)).is_some());
}

#[tokio::test(start_paused = true)]
async fn detonation_cancels_a_running_push() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;

    walk(&mut ana, Direction::Right).await;
    walk(&mut ana, Direction::Right).await;
    place_bomb(&mut ana).await;
    walk(&mut ana, Direction::Left).await;
    walk(&mut ana, Direction::Right).await;

    idle(&mut [&mut ana], Duration::from_millis(3000)).await;
    let room = ana.room();
    assert_eq!(room.bombs().count(), 0);
    // the bomb went off mid-slide: beyond (2, 0) but well short of (10, 0)
    assert!(room.blast_level(Position::new(8, 0)) > 0);
    assert_eq!(room.blast_level(Position::new(13, 0)), 0);
}

#[tokio::test(start_paused = true)]
async fn random_bombs_appear_when_enabled() {
    let broker = MemoryBroker::new();
    let mut config = config("ana");
    config.timing.random_bomb_ms = 500;
    let mut ana = start(&broker, &config).await;

    idle(&mut [&mut ana], Duration::from_millis(1200)).await;
    assert!(ana.room().bombs().any(|b| b.owner() == "random"));

    // random bombs are fused by the peer that dropped them
    idle(&mut [&mut ana], Duration::from_millis(2500)).await;
    assert!(ana.room().flames().count() > 0 || ana.room().bombs().count() > 0);
}

#[tokio::test(start_paused = true)]
async fn bomb_that_slid_before_its_explode_still_goes_off() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    place_bomb(&mut ana).await;
    let name = ana.room().bomb_at(SPAWN).unwrap().name.clone();

    // the fuse runs out while no frame is driven
    tokio::time::sleep(Duration::from_millis(2100)).await;
    // a slide lands on the wire ahead of the Explode aimed at the old cell
    let slid = BombRef {
        name,
        position: Position::new(1, 0),
    };
    inject(&broker, "lobby", &Event::BombMoved(slid)).await;
    ana.tick(FrameIntent::IDLE);

    idle(&mut [&mut ana], Duration::from_millis(1000)).await;
    assert_eq!(ana.room().bombs().count(), 0);
    // length 3 from (1, 0) reaches (4, 0); from the spawn it would stop at (3, 0)
    assert_eq!(ana.room().blast_level(Position::new(4, 0)), 1);
    assert_eq!(ana.room().blast_level(Position::new(1, 0)), 1);
}

#[tokio::test(start_paused = true)]
async fn dead_event_is_retried_when_the_outbound_queue_is_full() {
    let broker = MemoryBroker::new();
    let mut config = config("ana");
    config.queues = QueueConfig {
        outbound_capacity: 1,
        ..QueueConfig::default()
    };
    let mut ana = start(&broker, &config).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    for _ in 0..5 {
        walk(&mut ana, Direction::Right).await;
    }
    assert_eq!(position(&ana), Position::new(5, 0));

    let bomb = BombRef {
        name: "zed-aaaaa".to_owned(),
        position: Position::new(1, 0),
    };
    inject(&broker, "lobby", &Event::PlaceBomb(bomb.clone())).await;
    inject(&broker, "lobby", &Event::Explode(bomb)).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    assert!(alive(&ana));
    assert_eq!(ana.room().blast_level(Position::new(4, 0)), 1);

    // ana walks into the flames by an externally relayed move
    let into_flames = PlayerSnapshot {
        position: Position::new(4, 0),
        ..ana.local_player().unwrap().snapshot()
    };
    inject(&broker, "lobby", &Event::Move(into_flames)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // the bomb fills the one-slot queue, so the Dead event is dropped
    let report = ana.tick(FrameIntent {
        place_bomb: true,
        ..FrameIntent::IDLE
    });
    assert!(!report.local_died);
    assert_eq!(position(&ana), Position::new(4, 0));

    let died = idle(&mut [&mut ana], Duration::from_millis(64)).await;
    assert_eq!(died, vec![true]);
    assert!(!alive(&ana));
}

#[tokio::test(start_paused = true)]
async fn identity_taken_over_mid_session_is_reported() {
    let broker = MemoryBroker::new();
    let mut ana = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(50)).await;
    assert!(ana.ensure_identity().is_ok());

    broker.expire("lobby.identity.ana").await;
    let impostor = start(&broker, &config("ana")).await;
    idle(&mut [&mut ana], Duration::from_millis(3100)).await;

    assert!(matches!(
        ana.ensure_identity(),
        Err(SessionError::Net(NetError::DuplicateIdentity { .. }))
    ));
    assert!(!ana.is_leader());
    assert!(impostor.ensure_identity().is_ok());
}
