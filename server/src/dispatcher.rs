//! Routes decoded packets to the typed handler for their payload kind.

use async_trait::async_trait;
use log::{debug, warn};
use shared::protocol::{
    JoinGamePayload, ListGamesPayload, LoginPayload, SetAtomsPayload, SubmitMovePayload,
    SubmitSolutionPayload,
};
use shared::{Packet, PayloadType};

/// One handler per payload kind a client may send.
#[async_trait]
pub trait MessageHandler: Send {
    async fn on_login(&mut self, payload: LoginPayload);
    async fn on_list_games(&mut self, payload: ListGamesPayload);
    async fn on_join_game(&mut self, payload: JoinGamePayload);
    async fn on_set_atoms(&mut self, payload: SetAtomsPayload);
    async fn on_submit_solution(&mut self, payload: SubmitSolutionPayload);
    async fn on_submit_move(&mut self, payload: SubmitMovePayload);
}

/// Decodes one frame and hands it to `handler`.
///
/// Undecodable frames and server-to-client payloads are logged and dropped.
/// Returns the payload kind that was handled.
pub async fn dispatch<H: MessageHandler>(handler: &mut H, data: &[u8]) -> Option<PayloadType> {
    let packet = match Packet::decode(data) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping undecodable frame ({} bytes): {}", data.len(), e);
            return None;
        }
    };

    let kind = packet.payload_type();
    debug!("Dispatching {}", kind);

    match packet {
        Packet::Login(payload) => handler.on_login(payload).await,
        Packet::ListGames(payload) => handler.on_list_games(payload).await,
        Packet::JoinGame(payload) => handler.on_join_game(payload).await,
        Packet::SetAtoms(payload) => handler.on_set_atoms(payload).await,
        Packet::SubmitSolution(payload) => handler.on_submit_solution(payload).await,
        Packet::SubmitMove(payload) => handler.on_submit_move(payload).await,
        Packet::LoginAck(_)
        | Packet::ListGamesAck(_)
        | Packet::JoinGameAck(_)
        | Packet::UpdateGame(_) => {
            warn!("No handler registered for {}", kind);
            return None;
        }
    }

    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{LoginAckPayload, UpdateGamePayload};
    use shared::{GameState, Vector2};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn on_login(&mut self, payload: LoginPayload) {
            self.seen.push(format!("login:{}", payload.username));
        }
        async fn on_list_games(&mut self, _payload: ListGamesPayload) {
            self.seen.push("list".to_string());
        }
        async fn on_join_game(&mut self, payload: JoinGamePayload) {
            self.seen.push(format!("join:{}", payload.create_game));
        }
        async fn on_set_atoms(&mut self, payload: SetAtomsPayload) {
            self.seen.push(format!("atoms:{}", payload.atom_locations.len()));
        }
        async fn on_submit_solution(&mut self, payload: SubmitSolutionPayload) {
            self.seen.push(format!("solution:{}", payload.invite_code));
        }
        async fn on_submit_move(&mut self, payload: SubmitMovePayload) {
            self.seen.push(format!("move:{}", payload.entry));
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let mut recorder = Recorder::default();

        let login = Packet::Login(LoginPayload {
            register: true,
            username: "Alice".to_string(),
            key: None,
        });
        let moved = Packet::SubmitMove(SubmitMovePayload {
            invite_code: "g123".to_string(),
            entry: Vector2::new(0, 4),
        });

        assert_eq!(
            dispatch(&mut recorder, &login.encode().unwrap()).await,
            Some(PayloadType::Login)
        );
        assert_eq!(
            dispatch(&mut recorder, &moved.encode().unwrap()).await,
            Some(PayloadType::SubmitMove)
        );
        assert_eq!(recorder.seen, vec!["login:Alice", "move:(0, 4)"]);
    }

    #[tokio::test]
    async fn test_dispatch_drops_garbage() {
        let mut recorder = Recorder::default();
        assert_eq!(dispatch(&mut recorder, &[0xde, 0xad, 0xbe, 0xef, 0x01]).await, None);
        assert!(recorder.seen.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_server_payloads() {
        let mut recorder = Recorder::default();
        let packets = [
            Packet::LoginAck(LoginAckPayload::default()),
            Packet::UpdateGame(UpdateGamePayload {
                game_state: GameState::new("g1"),
            }),
        ];
        for packet in packets {
            assert_eq!(dispatch(&mut recorder, &packet.encode().unwrap()).await, None);
        }
        assert!(recorder.seen.is_empty());
    }
}
