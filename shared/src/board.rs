//! Ray simulation on the 10x10 border-inclusive board.
//!
//! The playable area is the 8x8 interior. Atoms are addressed in interior
//! coordinates (`0..8`) and stored one cell in from the border, so the
//! simulation grid sees them at `1..=8`. Rays enter from a non-corner border
//! cell and travel until they are absorbed or reach the border again.

use crate::math::Vector2;

/// Width and height of the simulation grid, border included.
pub const BOARD_SIZE: i32 = 10;
/// Width and height of the interior grid atoms are placed on.
pub const GRID_SIZE: i32 = 8;
/// Number of atoms every board holds once submitted.
pub const ATOM_COUNT: usize = 4;

// A ray visits each cell at most once per direction.
const MAX_STEPS: usize = (BOARD_SIZE * BOARD_SIZE * 4) as usize;

/// Returns true for any cell on (or beyond) the border ring.
pub fn is_side(cell: Vector2) -> bool {
    cell.x <= 0 || cell.x >= BOARD_SIZE - 1 || cell.y <= 0 || cell.y >= BOARD_SIZE - 1
}

pub fn is_corner(cell: Vector2) -> bool {
    let edge = |v: i32| v == 0 || v == BOARD_SIZE - 1;
    edge(cell.x) && edge(cell.y)
}

/// A ray may only be fired from a border cell inside the board that is not a corner.
pub fn is_valid_origin(cell: Vector2) -> bool {
    let in_range = |v: i32| (0..BOARD_SIZE).contains(&v);
    in_range(cell.x) && in_range(cell.y) && is_side(cell) && !is_corner(cell)
}

/// Atoms live on the interior grid, `0..GRID_SIZE` on both axes.
pub fn is_valid_atom(atom: Vector2) -> bool {
    let in_range = |v: i32| (0..GRID_SIZE).contains(&v);
    in_range(atom.x) && in_range(atom.y)
}

/// Board occupancy for a single set of atoms.
///
/// Build a fresh board for every atom set; nothing is shared between boards.
#[derive(Debug, Clone)]
pub struct VirtualBoard {
    cells: [[bool; BOARD_SIZE as usize]; BOARD_SIZE as usize],
}

impl VirtualBoard {
    /// Places atoms given in interior coordinates. Out-of-range atoms are ignored.
    pub fn new(atoms: &[Vector2]) -> Self {
        let mut cells = [[false; BOARD_SIZE as usize]; BOARD_SIZE as usize];
        for atom in atoms.iter().filter(|a| is_valid_atom(**a)) {
            let cell = *atom + Vector2::new(1, 1);
            cells[cell.x as usize][cell.y as usize] = true;
        }
        Self { cells }
    }

    /// Border cells never hold atoms.
    pub fn is_hit(&self, cell: Vector2) -> bool {
        !is_side(cell) && self.cells[cell.x as usize][cell.y as usize]
    }

    /// Traces a ray fired from `origin`.
    ///
    /// Returns the vertices of the path: the origin, every cell where the ray
    /// turned, and the final cell. The final cell is a border cell when the ray
    /// left the board, or the atom cell when it was absorbed. Returns `None`
    /// for an invalid origin.
    pub fn cast_ray(&self, origin: Vector2) -> Option<Vec<Vector2>> {
        if !is_valid_origin(origin) {
            return None;
        }

        let step = |v: i32| match v {
            0 => 1,
            v if v == BOARD_SIZE - 1 => -1,
            _ => 0,
        };
        let mut dir = Vector2::new(step(origin.x), step(origin.y));
        let mut path = vec![origin];
        let mut current = origin;
        let mut steps = 0;

        while !is_side(current) || (path.len() == 1 && current == origin) {
            steps += 1;
            if steps > MAX_STEPS {
                return None;
            }

            if self.is_hit(current + dir) {
                current += dir;
                break;
            }

            let left_hit = self.is_hit(current + dir.rotate_left() + dir);
            let right_hit = self.is_hit(current + dir.rotate_right() + dir);

            // Deflecting on the border sends the ray straight back out.
            if is_side(current) && (left_hit || right_hit) {
                break;
            }

            match (left_hit, right_hit) {
                (true, true) => {
                    path.push(current);
                    dir = dir.reversed();
                }
                (true, false) => {
                    path.push(current);
                    dir = dir.rotate_right();
                }
                (false, true) => {
                    path.push(current);
                    dir = dir.rotate_left();
                }
                (false, false) => {}
            }
            current += dir;
        }

        path.push(current);
        Some(path)
    }
}

/// Casts a single ray against `atoms` (interior coordinates).
pub fn cast_ray(origin: Vector2, atoms: &[Vector2]) -> Option<Vec<Vector2>> {
    VirtualBoard::new(atoms).cast_ray(origin)
}

/// Exit cell of a traced path, or `None` when the ray was absorbed.
pub fn ray_exit(path: &[Vector2]) -> Option<Vector2> {
    let end = *path.last()?;
    if path.len() == 1 || !is_side(end) {
        None
    } else {
        Some(end)
    }
}

/// The border cell directly across the board from `origin`.
pub fn opposite_border(origin: Vector2) -> Vector2 {
    let flip = |v: i32| match v {
        0 => BOARD_SIZE - 1,
        v if v == BOARD_SIZE - 1 => 0,
        v => v,
    };
    Vector2::new(flip(origin.x), flip(origin.y))
}

/// Every valid ray origin, clockwise from the top edge.
pub fn border_cells() -> Vec<Vector2> {
    let last = BOARD_SIZE - 1;
    let mut cells = Vec::with_capacity((GRID_SIZE * 4) as usize);
    cells.extend((1..last).map(|x| Vector2::new(x, 0)));
    cells.extend((1..last).map(|y| Vector2::new(last, y)));
    cells.extend((1..last).rev().map(|x| Vector2::new(x, last)));
    cells.extend((1..last).rev().map(|y| Vector2::new(0, y)));
    cells
}
