//! Performance benchmarks for critical game systems

use shared::board::{border_cells, opposite_border};
use shared::protocol::UpdateGamePayload;
use shared::{cast_ray, ray_exit, BoardMove, GameState, GameStatus, Packet, RosterEntry, Vector2, VirtualBoard};
use std::time::Instant;

fn sample_atoms(seed: i32) -> Vec<Vector2> {
    (0..4)
        .map(|i| Vector2::new((seed + i * 3) % 8, (seed * 5 + i * 7) % 8))
        .collect()
}

fn sample_state() -> GameState {
    let mut state = GameState::new("gBenchmark");
    state.metadata.status = GameStatus::PlayerATurn;
    state.metadata.roster = vec![
        RosterEntry {
            key: Some("pAlice".to_string()),
            username: "Alice".to_string(),
            online: true,
        },
        RosterEntry {
            key: Some("pBob".to_string()),
            username: "Bob".to_string(),
            online: true,
        },
    ];
    state.board_a.atom_locations = Some(sample_atoms(1));
    state.board_a.atoms_submitted = true;
    state.board_b.atom_locations = Some(sample_atoms(2));
    state.board_b.atoms_submitted = true;

    let board = VirtualBoard::new(&sample_atoms(2));
    for origin in border_cells().into_iter().take(16) {
        if let Some(path) = board.cast_ray(origin) {
            state.board_b.moves.push(BoardMove {
                entry: origin,
                exit: ray_exit(&path),
            });
        }
    }
    state
}

/// Benchmarks ray casting from every border cell
#[test]
fn benchmark_ray_casting() {
    let origins = border_cells();
    let boards: Vec<VirtualBoard> = (0..64).map(|seed| VirtualBoard::new(&sample_atoms(seed))).collect();

    let iterations = 100;
    let start = Instant::now();
    let mut absorbed = 0usize;

    for _ in 0..iterations {
        for board in &boards {
            for origin in &origins {
                let path = board.cast_ray(*origin).unwrap();
                if ray_exit(&path).is_none() {
                    absorbed += 1;
                }
            }
        }
    }

    let casts = iterations * boards.len() * origins.len();
    let duration = start.elapsed();
    println!(
        "Ray casting: {} casts in {:?} ({:.2} ns/cast, {} absorbed)",
        casts,
        duration,
        duration.as_nanos() as f64 / casts as f64,
        absorbed
    );

    // Should complete in under 2 seconds for ~200k casts
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the empty-board fast path and checks it against the geometry
#[test]
fn benchmark_empty_board() {
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for origin in border_cells() {
            let path = cast_ray(origin, &[]).unwrap();
            assert_eq!(path, vec![origin, opposite_border(origin)]);
        }
    }

    let duration = start.elapsed();
    println!("Empty board: {} sweeps in {:?}", iterations, duration);

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks projecting and encoding per-viewer updates
#[test]
fn benchmark_update_encoding() {
    let state = sample_state();
    let iterations = 10_000;
    let start = Instant::now();
    let mut bytes = 0usize;

    for i in 0..iterations {
        let view = state.projected_for((i % 3) as u32);
        let frame = Packet::UpdateGame(UpdateGamePayload { game_state: view })
            .encode()
            .unwrap();
        bytes += frame.len();
    }

    let duration = start.elapsed();
    println!(
        "Update encoding: {} updates ({} bytes) in {:?} ({:.2} μs/update)",
        iterations,
        bytes,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the storage form used on every save
#[test]
fn benchmark_normalized_json() {
    let state = sample_state();
    let iterations = 5_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let json = state.to_json().unwrap();
        let restored = GameState::from_json(&json).unwrap();
        assert_eq!(restored.board_b.moves.len(), state.board_b.moves.len());
    }

    let duration = start.elapsed();
    println!("Normalized JSON: {} round trips in {:?}", iterations, duration);

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
