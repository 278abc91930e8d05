//! Session lifecycle through the hub, without any transport.

use fourline_ai::create_opponent;
use fourline_engine::board::Cell;
use fourline_engine::errors::GameError;
use fourline_web::protocol::EndPayload;
use fourline_web::sink::EventTopic;
use fourline_web::{
    Connection, Hub, HubError, HubSettings, MemorySink, ResultStore, ServerFrame, SinkHandle,
};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> HubSettings {
    HubSettings {
        matchmaking_timeout: Duration::from_millis(100),
        bot_delay: Duration::from_millis(20),
        outbound_capacity: 64,
        join_timeout: Duration::from_secs(1),
    }
}

fn hub_with(settings: HubSettings) -> (Arc<Hub>, Arc<MemorySink>) {
    let store = Arc::new(MemorySink::new());
    let sink = SinkHandle::spawn(store.clone(), 256);
    let opponent = create_opponent("heuristic").expect("heuristic opponent");
    (Hub::new(settings, opponent, sink), store)
}

async fn next_frame(conn: &mut Connection) -> ServerFrame {
    tokio::time::timeout(Duration::from_secs(2), conn.frames.recv())
        .await
        .expect("frame before deadline")
        .expect("outbox open")
}

fn assert_quiet(conn: &mut Connection) {
    assert!(
        conn.frames.try_recv().is_err(),
        "unexpected frame for {}",
        conn.id
    );
}

async fn expect_start(conn: &mut Connection) -> (String, String, String) {
    match next_frame(conn).await {
        ServerFrame::Start { game_id, payload } => (game_id, payload.player1, payload.player2),
        other => panic!("expected start, got {other:?}"),
    }
}

async fn pair(hub: &Arc<Hub>, first: &str, second: &str) -> (Connection, Connection, String) {
    let mut a = hub.join(first).expect("first joins");
    let mut b = hub.join(second).expect("second joins");
    let (game_a, ..) = expect_start(&mut a).await;
    let (game_b, ..) = expect_start(&mut b).await;
    assert_eq!(game_a, game_b);
    (a, b, game_a)
}

#[tokio::test]
async fn two_players_fill_the_center_column() {
    let (hub, _store) = hub_with(settings());
    let mut alice = hub.join("alice").expect("alice joins");
    assert_eq!(hub.waiting_count(), 1);
    let mut bob = hub.join("bob").expect("bob joins");
    assert_eq!(hub.waiting_count(), 0);

    let (game_id, player1, player2) = expect_start(&mut alice).await;
    assert_eq!((player1.as_str(), player2.as_str()), ("alice", "bob"));
    let (bob_game, ..) = expect_start(&mut bob).await;
    assert_eq!(bob_game, game_id);

    for i in 0..6usize {
        let (mover, name, cell) = if i % 2 == 0 {
            (alice.id, "alice", Cell::One)
        } else {
            (bob.id, "bob", Cell::Two)
        };
        let placement = hub.submit_move(mover, 3).expect("room in column 3");
        assert_eq!(placement.row, 5 - i);

        for conn in [&mut alice, &mut bob] {
            match next_frame(conn).await {
                ServerFrame::Move { game_id: id, payload } => {
                    assert_eq!(id, game_id);
                    assert_eq!(payload.player, name);
                    assert_eq!(payload.column, 3);
                    assert_eq!(payload.board.get(5 - i, 3), cell);
                }
                other => panic!("expected move, got {other:?}"),
            }
        }
    }

    let err = hub.submit_move(alice.id, 3).unwrap_err();
    assert!(matches!(
        err,
        HubError::Gameplay(GameError::ColumnFull { column: 3 })
    ));
    assert_eq!(next_frame(&mut alice).await, ServerFrame::error("column full"));
    assert_quiet(&mut bob);

    let snapshot = hub.snapshot(&game_id).expect("still active");
    assert_eq!(snapshot.moves(), 6);
    assert!(!snapshot.is_finished());
}

#[tokio::test]
async fn out_of_turn_and_out_of_range_moves_reach_only_the_sender() {
    let (hub, _store) = hub_with(settings());
    let (mut alice, mut bob, game_id) = pair(&hub, "alice", "bob").await;

    assert!(hub.submit_move(bob.id, 0).is_err());
    assert_eq!(next_frame(&mut bob).await, ServerFrame::error("not your turn"));
    assert_quiet(&mut alice);

    for column in [-1, 7, i64::MAX] {
        assert!(hub.submit_move(alice.id, column).is_err());
        assert_eq!(
            next_frame(&mut alice).await,
            ServerFrame::error("invalid column")
        );
    }
    assert_quiet(&mut bob);
    assert_eq!(hub.snapshot(&game_id).map(|m| m.moves()), Some(0));
}

#[tokio::test]
async fn lone_player_meets_the_bot_after_the_timeout() {
    let (hub, store) = hub_with(settings());
    let mut carol = hub.join("carol").expect("carol joins");
    assert_quiet(&mut carol);

    let (game_id, player1, player2) = expect_start(&mut carol).await;
    assert_eq!(player1, "carol");
    assert_eq!(player2, "BOT");
    assert_eq!(hub.waiting_count(), 0);
    // The bot moves second, so nothing arrives until carol plays.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_quiet(&mut carol);

    hub.submit_move(carol.id, 3).expect("carol moves");
    match next_frame(&mut carol).await {
        ServerFrame::Move { payload, .. } => assert_eq!(payload.player, "carol"),
        other => panic!("expected carol's move, got {other:?}"),
    }
    match next_frame(&mut carol).await {
        ServerFrame::Move { game_id: id, payload } => {
            assert_eq!(id, game_id);
            assert_eq!(payload.player, "BOT");
            assert_eq!(payload.column, 3);
            assert_eq!(payload.board.get(4, 3), Cell::Two);
        }
        other => panic!("expected bot move, got {other:?}"),
    }

    hub.sink().flush().await;
    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].record.player2, "BOT");
    assert!(!sessions[0].finished);
}

#[tokio::test]
async fn bot_blocks_a_vertical_three() {
    let (hub, _store) = hub_with(settings());
    let mut carol = hub.join("carol").expect("carol joins");
    let (game_id, ..) = expect_start(&mut carol).await;

    // carol stacks column 0 while the bot takes the center column.
    for _ in 0..2 {
        hub.submit_move(carol.id, 0).expect("carol stacks");
        next_frame(&mut carol).await;
        next_frame(&mut carol).await;
    }
    hub.submit_move(carol.id, 0).expect("carol threatens");
    next_frame(&mut carol).await;

    match next_frame(&mut carol).await {
        ServerFrame::Move { payload, .. } => {
            assert_eq!(payload.player, "BOT");
            assert_eq!(payload.column, 0);
            assert_eq!(payload.board.get(2, 0), Cell::Two);
            assert_eq!(payload.board.get(4, 3), Cell::Two);
        }
        other => panic!("expected bot move, got {other:?}"),
    }
    let game = hub.snapshot(&game_id).expect("active");
    assert_eq!(game.moves(), 6);
}

#[tokio::test]
async fn pairing_before_the_timeout_cancels_the_bot_game() {
    let (hub, store) = hub_with(settings());
    let (mut alice, mut bob, game_id) = pair(&hub, "alice", "bob").await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(hub.active_sessions(), vec![game_id]);
    assert_quiet(&mut alice);
    assert_quiet(&mut bob);
    assert_eq!(hub.expire_wait(alice.id).expect("expiry"), None);

    hub.sink().flush().await;
    assert_eq!(store.sessions().len(), 1);
}

#[tokio::test]
async fn leaving_the_queue_has_no_further_effect() {
    let (hub, store) = hub_with(settings());
    let carol = hub.join("carol").expect("carol joins");
    assert_eq!(hub.disconnect(carol.id).expect("disconnect"), None);
    assert_eq!(hub.waiting_count(), 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(hub.active_sessions().is_empty());

    // The next player waits rather than pairing with the departed one.
    let mut dave = hub.join("dave").expect("dave joins");
    assert_eq!(hub.waiting_count(), 1);
    assert_quiet(&mut dave);

    hub.sink().flush().await;
    assert!(store.sessions().is_empty());
}

#[tokio::test]
async fn disconnect_forfeits_exactly_once() {
    let (hub, store) = hub_with(settings());
    let (alice, mut bob, game_id) = pair(&hub, "alice", "bob").await;
    hub.submit_move(alice.id, 3).expect("alice moves");
    next_frame(&mut bob).await;

    assert_eq!(
        hub.disconnect(alice.id).expect("disconnect"),
        Some(game_id.clone())
    );
    match next_frame(&mut bob).await {
        ServerFrame::End { game_id: id, payload } => {
            assert_eq!(id, game_id);
            assert_eq!(payload.winner, "bob");
            assert!(payload.forfeit);
        }
        other => panic!("expected end, got {other:?}"),
    }

    assert_eq!(hub.disconnect(alice.id).expect("second disconnect"), None);
    assert_eq!(hub.disconnect(bob.id).expect("bob leaves"), None);
    assert!(hub.active_sessions().is_empty());
    assert!(hub.snapshot(&game_id).is_none());

    hub.sink().flush().await;
    let results = store.results().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner, "bob");
    assert_eq!(results[0].moves, 1);

    let sessions = store.sessions();
    assert!(sessions[0].finished);
    assert_eq!(sessions[0].winner.as_deref(), Some("bob"));

    let ends = store
        .events_for(&game_id)
        .into_iter()
        .filter(|e| e.topic == EventTopic::GameEnd)
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn win_ends_records_and_reaps_the_session() {
    let (hub, store) = hub_with(settings());
    let (mut alice, mut bob, game_id) = pair(&hub, "alice", "bob").await;

    for (conn, column) in [
        (alice.id, 0),
        (bob.id, 1),
        (alice.id, 0),
        (bob.id, 1),
        (alice.id, 0),
        (bob.id, 1),
        (alice.id, 0),
    ] {
        hub.submit_move(conn, column).expect("legal move");
    }

    for conn in [&mut alice, &mut bob] {
        for _ in 0..7 {
            assert!(matches!(next_frame(conn).await, ServerFrame::Move { .. }));
        }
        match next_frame(conn).await {
            ServerFrame::End { payload, .. } => {
                assert_eq!(payload.winner, "alice");
                assert!(!payload.forfeit);
            }
            other => panic!("expected end, got {other:?}"),
        }
    }

    assert!(hub.snapshot(&game_id).is_none());
    assert_eq!(hub.session_of(alice.id), None);
    assert!(matches!(
        hub.submit_move(alice.id, 2),
        Err(HubError::NoActiveGame)
    ));
    assert_eq!(next_frame(&mut alice).await, ServerFrame::error("no active game"));

    // Closing after a natural finish changes nothing.
    assert_eq!(hub.disconnect(bob.id).expect("bob leaves"), None);

    hub.sink().flush().await;
    let results = store.results().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner, "alice");
    assert_eq!(results[0].moves, 7);
    assert_eq!(results[0].player1, "alice");
    assert_eq!(results[0].player2, "bob");
    assert!(results[0].duration_ms >= 0);

    let topics: Vec<_> = store
        .events_for(&game_id)
        .into_iter()
        .map(|e| e.topic)
        .collect();
    assert_eq!(topics.len(), 9);
    assert_eq!(topics.first(), Some(&EventTopic::GameStart));
    assert_eq!(topics.last(), Some(&EventTopic::GameEnd));
}

#[tokio::test]
async fn leaving_mid_bot_turn_awards_the_bot() {
    let (hub, store) = hub_with(HubSettings {
        bot_delay: Duration::from_millis(100),
        ..settings()
    });
    let mut carol = hub.join("carol").expect("carol joins");
    let (game_id, ..) = expect_start(&mut carol).await;

    hub.submit_move(carol.id, 3).expect("carol moves");
    assert_eq!(
        hub.disconnect(carol.id).expect("disconnect"),
        Some(game_id.clone())
    );

    // The pending bot turn finds the session gone and does nothing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.play_bot_turn(&game_id).expect("bot turn"), None);

    hub.sink().flush().await;
    let results = store.results().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner, "BOT");
    assert_eq!(results[0].moves, 1);
}

#[tokio::test]
async fn reserved_and_blank_names_are_refused() {
    let (hub, _store) = hub_with(settings());
    for name in ["", "   ", "BOT", "draw", "DRAW"] {
        assert!(matches!(hub.join(name), Err(HubError::Protocol(_))), "{name:?}");
    }
    assert_eq!(hub.waiting_count(), 0);
}

#[tokio::test]
async fn shared_names_still_play_their_own_seats() {
    let (hub, _store) = hub_with(settings());
    let (sam_one, mut sam_two, _game_id) = pair(&hub, "sam", "sam").await;

    assert!(hub.submit_move(sam_two.id, 0).is_err());
    assert_eq!(next_frame(&mut sam_two).await, ServerFrame::error("not your turn"));
    hub.submit_move(sam_one.id, 0).expect("first seat moves");
    hub.submit_move(sam_two.id, 0).expect("second seat moves");
}

#[tokio::test]
async fn bot_win_finishes_records_and_reaps() {
    let (hub, store) = hub_with(settings());
    let mut carol = hub.join("carol").expect("carol joins");
    let (game_id, ..) = expect_start(&mut carol).await;

    // The bot answers center-out and completes column 3 on its fourth move.
    for column in [6, 6, 5, 0] {
        hub.submit_move(carol.id, column).expect("carol moves");
        match next_frame(&mut carol).await {
            ServerFrame::Move { payload, .. } => assert_eq!(payload.player, "carol"),
            other => panic!("expected carol's move, got {other:?}"),
        }
        match next_frame(&mut carol).await {
            ServerFrame::Move { payload, .. } => {
                assert_eq!(payload.player, "BOT");
                assert_eq!(payload.column, 3);
            }
            other => panic!("expected bot move, got {other:?}"),
        }
    }

    assert_eq!(
        next_frame(&mut carol).await,
        ServerFrame::End {
            game_id: game_id.clone(),
            payload: EndPayload {
                winner: "BOT".into(),
                forfeit: false,
            },
        }
    );
    assert!(hub.snapshot(&game_id).is_none());
    assert_eq!(hub.session_of(carol.id), None);

    hub.sink().flush().await;
    let results = store.results().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner, "BOT");
    assert_eq!(results[0].moves, 8);
    let sessions = store.sessions();
    assert!(sessions[0].finished);
    assert_eq!(sessions[0].winner.as_deref(), Some("BOT"));
}

#[tokio::test]
async fn full_board_ends_in_a_draw() {
    const DRAWN_GAME: [i64; 42] = [
        2, 0, 0, 2, 2, 0, 0, 2, 2, 0, 0, 2, //
        3, 1, 1, 3, 3, 1, 1, 3, 3, 1, 1, 3, //
        6, 4, 4, 5, 5, 6, 6, 4, 4, 5, 5, 6, 6, 4, 4, 5, 5, 6,
    ];
    let (hub, store) = hub_with(settings());
    let (mut alice, mut bob, game_id) = pair(&hub, "alice", "bob").await;

    for (index, &column) in DRAWN_GAME.iter().enumerate() {
        let conn = if index % 2 == 0 { alice.id } else { bob.id };
        hub.submit_move(conn, column)
            .unwrap_or_else(|err| panic!("move {index} rejected: {err}"));
    }

    for conn in [&mut alice, &mut bob] {
        for _ in 0..DRAWN_GAME.len() {
            assert!(matches!(next_frame(conn).await, ServerFrame::Move { .. }));
        }
        match next_frame(conn).await {
            ServerFrame::End { game_id: id, payload } => {
                assert_eq!(id, game_id);
                assert_eq!(payload.winner, "draw");
                assert!(!payload.forfeit);
            }
            other => panic!("expected end, got {other:?}"),
        }
    }
    assert!(hub.snapshot(&game_id).is_none());

    hub.sink().flush().await;
    let results = store.results().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner, "draw");
    assert_eq!(results[0].moves, 42);
    let sessions = store.sessions();
    assert!(sessions[0].finished);
    assert_eq!(sessions[0].winner.as_deref(), Some("draw"));
}
