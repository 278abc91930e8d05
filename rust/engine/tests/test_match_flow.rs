use fourline_engine::board::{Cell, COLS, ROWS};
use fourline_engine::game::{EndReason, Match, Winner};
use fourline_engine::errors::GameError;
use fourline_engine::player::Side;

/// Column order that fills the whole board without ever completing a line.
const DRAWN_GAME: [usize; 42] = [
    2, 0, 0, 2, 2, 0, 0, 2, 2, 0, 0, 2, //
    3, 1, 1, 3, 3, 1, 1, 3, 3, 1, 1, 3, //
    6, 4, 4, 5, 5, 6, 6, 4, 4, 5, 5, 6, 6, 4, 4, 5, 5, 6,
];

fn play(game: &mut Match, column: usize) -> Result<usize, GameError> {
    let actor = game.current_player().to_string();
    game.apply_move(column, &actor).map(|placement| placement.row)
}

#[test]
fn move_counter_tracks_successful_moves_only() {
    let mut game = Match::new("g", "alice", "bob");
    let mut successes = 0;

    for column in [3, 3, 9, 4, 4] {
        if play(&mut game, column).is_ok() {
            successes += 1;
        }
    }
    assert!(game.apply_move(0, "nobody").is_err());

    assert_eq!(successes, 4);
    assert_eq!(game.moves(), 4);
    assert!(!game.is_finished());
}

#[test]
fn column_three_fills_bottom_up_then_rejects() {
    let mut game = Match::new("g", "alice", "bob");

    for expected_row in (0..ROWS).rev() {
        assert_eq!(play(&mut game, 3), Ok(expected_row));
    }

    let before = *game.board();
    let err = play(&mut game, 3).unwrap_err();
    assert_eq!(err, GameError::ColumnFull { column: 3 });
    assert_eq!(game.board(), &before);
    assert_eq!(game.moves(), ROWS as u32);
}

#[test]
fn full_column_never_spills_into_neighbours() {
    let mut game = Match::new("g", "alice", "bob");
    for _ in 0..ROWS {
        play(&mut game, 0).expect("room in column");
    }
    let before = *game.board();
    for _ in 0..3 {
        assert!(matches!(play(&mut game, 0), Err(GameError::ColumnFull { .. })));
    }
    assert_eq!(game.board(), &before);
    for col in 1..COLS {
        assert_eq!(game.board().get(ROWS - 1, col), Cell::Empty);
    }
}

#[test]
fn vertical_four_wins_for_the_mover() {
    let mut game = Match::new("g", "alice", "bob");
    for _ in 0..3 {
        play(&mut game, 0).expect("alice");
        play(&mut game, 1).expect("bob");
    }
    play(&mut game, 0).expect("alice wins");

    let outcome = game.outcome().expect("finished");
    assert_eq!(outcome.winner, Winner::Player("alice".into()));
    assert_eq!(outcome.reason, EndReason::Connect);
    assert_eq!(game.moves(), 7);
}

#[test]
fn moves_after_finish_are_rejected_and_board_is_frozen() {
    let mut game = Match::new("g", "alice", "bob");
    for _ in 0..3 {
        play(&mut game, 0).expect("alice");
        play(&mut game, 1).expect("bob");
    }
    play(&mut game, 0).expect("alice wins");
    let frozen = *game.board();

    for column in 0..COLS {
        assert_eq!(game.apply_move(column, "bob"), Err(GameError::GameAlreadyFinished));
        assert_eq!(game.apply_move(column, "alice"), Err(GameError::GameAlreadyFinished));
    }
    assert_eq!(game.board(), &frozen);
    assert_eq!(game.moves(), 7);
}

#[test]
fn full_board_without_line_is_a_draw() {
    let mut game = Match::new("g", "alice", "bob");

    for (index, &column) in DRAWN_GAME.iter().enumerate() {
        assert!(!game.is_finished(), "finished early at move {index}");
        play(&mut game, column).unwrap_or_else(|err| panic!("move {index} rejected: {err}"));
    }

    let outcome = game.outcome().expect("finished");
    assert_eq!(outcome.winner, Winner::Draw);
    assert_eq!(outcome.reason, EndReason::BoardFull);
    assert_eq!(outcome.winner.as_str(), "draw");
    assert!(game.board().is_full());
    assert_eq!(game.moves(), 42);
}

#[test]
fn turn_does_not_toggle_on_terminal_move() {
    let mut game = Match::new("g", "alice", "bob");
    for _ in 0..3 {
        play(&mut game, 0).expect("alice");
        play(&mut game, 1).expect("bob");
    }
    play(&mut game, 0).expect("alice wins");
    assert_eq!(game.current_side(), Side::One);
}

#[test]
fn timestamps_advance_with_moves() {
    let mut game = Match::new("g", "alice", "bob");
    assert_eq!(game.started_at(), game.last_move_at());
    play(&mut game, 2).expect("alice");
    assert!(game.last_move_at() >= game.started_at());
    assert!(game.elapsed(game.last_move_at()) >= chrono::Duration::zero());
}
