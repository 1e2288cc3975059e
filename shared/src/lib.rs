//! Types shared by the Black Box server and its clients: board geometry and
//! ray simulation, game session state, and the wire protocol.

pub mod board;
pub mod math;
pub mod protocol;
pub mod state;

pub use board::{cast_ray, ray_exit, VirtualBoard, ATOM_COUNT, BOARD_SIZE, GRID_SIZE};
pub use math::Vector2;
pub use protocol::{CodecError, Packet, PayloadType};
pub use state::{BoardMove, GameBoard, GameMetadata, GameState, GameStatus, RosterEntry};
