use parlor::prelude::*;
use parlor_room::EngineRegistry;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum Cell {
    #[default]
    Empty,
    X,
    O,
}

/// Kept in `Room::state` between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Board {
    cells: [[Cell; 3]; 3],
    x: UserId,
    o: UserId,
}

impl Board {
    fn new(x: UserId, o: UserId) -> Self {
        Self {
            cells: [[Cell::Empty; 3]; 3],
            x,
            o,
        }
    }

    fn load(room: &Room) -> Result<Self, EngineError> {
        serde_json::from_value(room.state.clone())
            .map_err(|e| EngineError::Rejected(format!("no board: {e}")))
    }

    fn store(&self, room: &mut Room) -> Result<(), EngineError> {
        room.state = serde_json::to_value(self).map_err(|e| EngineError::Rejected(e.to_string()))?;
        Ok(())
    }

    fn mark_of(&self, user: &UserId) -> Cell {
        if *user == self.x { Cell::X } else { Cell::O }
    }

    fn opponent(&self, user: &UserId) -> &UserId {
        if *user == self.x { &self.o } else { &self.x }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Move {
    row: usize,
    col: usize,
}

// ---------------------------------------------------------------------------
// Game engine
// ---------------------------------------------------------------------------

struct TicTacToe;

impl GameEngine for TicTacToe {
    fn on_ready(
        &self,
        room: &mut Room,
        user: &UserId,
        payload: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let ready = payload.as_bool().unwrap_or(true);
        let all_ready = room.set_ready(user, ready)?;
        let mut effects = vec![EngineEffect::SendInRoom(Notification::game(
            "ready",
            json!({ "user": user, "ready": ready }),
        ))];
        if !all_ready || room.players.len() != 2 {
            return Ok(effects);
        }

        let Some(first) = room.players.choose(&mut rand::rng()).cloned() else {
            return Ok(effects);
        };
        let second = room
            .players
            .iter()
            .find(|p| **p != first)
            .cloned()
            .unwrap_or_else(|| first.clone());
        Board::new(first.clone(), second).store(room)?;

        effects.push(EngineEffect::RoundStart);
        effects.push(EngineEffect::StartTurn { user: first });
        Ok(effects)
    }

    fn on_turn(
        &self,
        room: &mut Room,
        user: &UserId,
        turn: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let mut board = Board::load(room)?;
        let Some(mv) = validate(&board, turn) else {
            // Bad move: tell the player and keep their turn running.
            return Ok(vec![EngineEffect::SendToUser(
                user.clone(),
                Notification::game("error", json!("invalid move")),
            )]);
        };

        let mark = board.mark_of(user);
        board.cells[mv.row][mv.col] = mark;
        board.store(room)?;

        let mut effects = vec![EngineEffect::SendInRoom(Notification::game(
            "turn",
            json!({ "user": user, "row": mv.row, "col": mv.col, "mark": mark }),
        ))];
        if check_winner(&board.cells, mark) {
            effects.push(EngineEffect::RoundEnd {
                result: json!({ "winner": user, "reason": "line" }),
                players: room.players.clone(),
            });
        } else if board_full(&board.cells) {
            effects.push(EngineEffect::RoundEnd {
                result: json!({ "winner": null, "reason": "draw" }),
                players: room.players.clone(),
            });
        } else {
            effects.push(EngineEffect::StartTurn {
                user: board.opponent(user).clone(),
            });
        }
        Ok(effects)
    }

    /// An offline player who runs out of time loses; an online one just
    /// loses the turn.
    fn on_timeout(
        &self,
        room: &mut Room,
        user: &UserId,
        timeout: &Value,
    ) -> Result<Vec<EngineEffect>, EngineError> {
        let board = Board::load(room)?;
        let opponent = board.opponent(user).clone();
        if timeout["online"].as_bool() == Some(false) {
            return Ok(vec![EngineEffect::RoundEnd {
                result: json!({ "winner": opponent, "reason": "timeout" }),
                players: room.players.clone(),
            }]);
        }
        Ok(vec![
            EngineEffect::SendInRoom(Notification::game("timeout", json!({ "user": user }))),
            EngineEffect::StartTurn { user: opponent },
        ])
    }
}

fn validate(board: &Board, turn: &Value) -> Option<Move> {
    let mv: Move = serde_json::from_value(turn.clone()).ok()?;
    if mv.row >= 3 || mv.col >= 3 || board.cells[mv.row][mv.col] != Cell::Empty {
        return None;
    }
    Some(mv)
}

fn check_winner(b: &[[Cell; 3]; 3], m: Cell) -> bool {
    (0..3).any(|i| (0..3).all(|j| b[i][j] == m))           // rows
    || (0..3).any(|j| (0..3).all(|i| b[i][j] == m))        // cols
    || (0..3).all(|i| b[i][i] == m)                         // diagonal
    || (0..3).all(|i| b[i][2 - i] == m)                     // anti-diagonal
}

fn board_full(b: &[[Cell; 3]; 3]) -> bool {
    b.iter().all(|row| row.iter().all(|c| *c != Cell::Empty))
}

// ---------------------------------------------------------------------------
// Bootstrap: one table, two seated players, a scripted game
// ---------------------------------------------------------------------------

const GAME: &str = "tic-tac-toe";
const TABLE: &str = "table-1";

async fn seed(store: &MemoryStore, players: &[UserId]) -> Result<(), Box<dyn std::error::Error>> {
    let game = GameId::new(GAME);
    let room = Room::new(
        RoomId::new(TABLE),
        game.clone(),
        "ranked",
        players.to_vec(),
        std::time::Duration::from_secs(20),
    )?;
    store.insert_room(&room).await?;
    for player in players {
        store
            .assign_user(&game, player, &UserRoom::player(RoomId::new(TABLE)))
            .await?;
        store.connect_user(&game, player, format!("ws-{player}")).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    parlor::telemetry::init();

    let game = GameId::new(GAME);
    let players = [UserId::new("alice"), UserId::new("bob")];
    let store = MemoryStore::new();
    seed(&store, &players).await?;

    let mut engines = EngineRegistry::new();
    engines.register(game.clone(), TicTacToe, GameConfig::default());
    let (bus, mut outbound) = ChannelBus::new();
    let (coordinator, mut worker) =
        Coordinator::new(store.clone(), bus, engines, CoordinatorConfig::default());

    tokio::spawn(async move {
        while let Some(signal) = outbound.recv().await {
            match signal.notification() {
                Some(n) => tracing::info!(kind = %n.kind, data = %n.data, "published"),
                None => tracing::info!(?signal, "published"),
            }
        }
    });

    for player in &players {
        coordinator
            .on_user_message(game.clone(), player.clone(), EventKind::Ready, json!(true))
            .await?;
    }
    worker.run_until_idle().await;

    // Whoever moves first takes the top row.
    let moves = [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)];
    for (row, col) in moves {
        let Some(room) = store.load_room(&game, &RoomId::new(TABLE)).await? else {
            break;
        };
        let Some(current) = room.current_id else {
            break;
        };
        coordinator
            .on_user_message(
                game.clone(),
                current,
                EventKind::Turn,
                json!({ "row": row, "col": col }),
            )
            .await?;
        worker.run_until_idle().await;
    }

    if let Some(room) = store.load_room(&game, &RoomId::new(TABLE)).await? {
        tracing::info!(state = %room.game_state, "game over");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor::Outbound;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    fn room_with_board(x: UserId, o: UserId) -> Room {
        let mut room = Room::new(
            RoomId::new(TABLE),
            GameId::new(GAME),
            "ranked",
            vec![x.clone(), o.clone()],
            std::time::Duration::from_secs(20),
        )
        .unwrap();
        Board::new(x, o).store(&mut room).unwrap();
        room
    }

    #[test]
    fn test_turn_occupied_cell_keeps_turn() {
        let mut room = room_with_board(alice(), bob());
        TicTacToe.on_turn(&mut room, &alice(), &json!({ "row": 0, "col": 0 })).unwrap();

        let effects = TicTacToe.on_turn(&mut room, &bob(), &json!({ "row": 0, "col": 0 })).unwrap();
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            &effects[0],
            EngineEffect::SendToUser(user, n) if *user == bob() && n.kind == "error"
        ));
    }

    #[test]
    fn test_turn_out_of_bounds_rejected() {
        let mut room = room_with_board(alice(), bob());
        let turn = json!({ "row": 3, "col": 0 });
        let effects = TicTacToe.on_turn(&mut room, &alice(), &turn).unwrap();
        assert!(matches!(&effects[0], EngineEffect::SendToUser(..)));
    }

    #[test]
    fn test_turn_passes_to_opponent() {
        let mut room = room_with_board(alice(), bob());
        let turn = json!({ "row": 1, "col": 1 });
        let effects = TicTacToe.on_turn(&mut room, &alice(), &turn).unwrap();
        assert_eq!(effects.last(), Some(&EngineEffect::StartTurn { user: bob() }));
        assert_eq!(Board::load(&room).unwrap().cells[1][1], Cell::X);
    }

    #[test]
    fn test_offline_timeout_forfeits() {
        let mut room = room_with_board(alice(), bob());
        let effects = TicTacToe
            .on_timeout(&mut room, &alice(), &json!({ "online": false }))
            .unwrap();
        match &effects[0] {
            EngineEffect::RoundEnd { result, .. } => assert_eq!(result["winner"], "bob"),
            other => panic!("expected RoundEnd, got {other:?}"),
        }
    }

    #[test]
    fn test_win_detection_all_lines() {
        // Rows
        for row in 0..3 {
            let mut b = [[Cell::Empty; 3]; 3];
            for col in 0..3 { b[row][col] = Cell::X; }
            assert!(check_winner(&b, Cell::X), "row {row}");
        }
        // Columns
        for col in 0..3 {
            let mut b = [[Cell::Empty; 3]; 3];
            for row in 0..3 { b[row][col] = Cell::O; }
            assert!(check_winner(&b, Cell::O), "col {col}");
        }
        // Diagonals
        let mut b = [[Cell::Empty; 3]; 3];
        for i in 0..3 { b[i][i] = Cell::X; }
        assert!(check_winner(&b, Cell::X), "main diagonal");

        let mut b = [[Cell::Empty; 3]; 3];
        for i in 0..3 { b[i][2-i] = Cell::O; }
        assert!(check_winner(&b, Cell::O), "anti-diagonal");
    }

    // ---------------------------------------------------------------
    // Full game through the coordinator: first mover takes the top row
    //  X | X | X
    //  O | O | .
    //  . | . | .
    // ---------------------------------------------------------------
    #[tokio::test]
    async fn test_full_game_through_coordinator() {
        let game = GameId::new(GAME);
        let players = [alice(), bob()];
        let store = MemoryStore::new();
        seed(&store, &players).await.unwrap();
        let mut engines = EngineRegistry::new();
        engines.register(game.clone(), TicTacToe, GameConfig::default());
        let (bus, mut outbound) = ChannelBus::new();
        let (coordinator, mut worker) =
            Coordinator::new(store.clone(), bus, engines, CoordinatorConfig::default());

        for player in &players {
            coordinator
                .on_user_message(game.clone(), player.clone(), EventKind::Ready, json!(true))
                .await
                .unwrap();
        }
        worker.run_until_idle().await;

        let room = store.load_room(&game, &RoomId::new(TABLE)).await.unwrap().unwrap();
        let first = room.current_id.clone().unwrap();

        for (row, col) in [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)] {
            let room = store.load_room(&game, &RoomId::new(TABLE)).await.unwrap().unwrap();
            let current = room.current_id.unwrap();
            coordinator
                .on_user_message(
                    game.clone(),
                    current,
                    EventKind::Turn,
                    json!({ "row": row, "col": col }),
                )
                .await
                .unwrap();
            worker.run_until_idle().await;
        }

        let room = store.load_room(&game, &RoomId::new(TABLE)).await.unwrap().unwrap();
        assert!(room.is_waiting());

        let mut round_end = None;
        while let Ok(signal) = outbound.try_recv() {
            if let Outbound::InRoom { notification, .. } = signal {
                if notification.kind == "round_end" {
                    round_end = Some(notification.data);
                }
            }
        }
        let result = round_end.expect("round_end published");
        assert_eq!(result["winner"], json!(first));
        assert_eq!(result["reason"], "line");
    }
}
