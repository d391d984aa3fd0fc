//! Grid assembly from an unordered cloud of X-corner positions.
//!
//! Corners are linked to their four lattice neighbours along a global pair of
//! grid axes, edges are kept only when both ends agree, and the largest
//! connected component is labelled with integer `(i, j)` coordinates by BFS.
//! Column index `i` grows along the axis closest to image +x, row index `j`
//! along its perpendicular (image +y side).

use crate::params::GridGraphParams;
use calib_camera_core::{Corner, GridCoords};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Grid step `(di, dj)` taken by following an edge in this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Reasons a corner cloud does not form the requested grid.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("need at least {needed} corners, got {got}")]
    TooFewCorners { needed: usize, got: usize },
    #[error("could not estimate the grid axes")]
    NoAxes,
    #[error("corner graph is not a consistent lattice")]
    InconsistentTopology,
    #[error(
        "largest component spans {cols}x{rows} without a complete {expected_cols}x{expected_rows} window"
    )]
    Incomplete {
        cols: u32,
        rows: u32,
        expected_cols: u32,
        expected_rows: u32,
    },
}

/// Corners of a complete grid, listed row by row with `i` running fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct GridMatch {
    pub cols: u32,
    pub rows: u32,
    /// `corner_indices[j * cols + i]` indexes the input corner slice.
    pub corner_indices: Vec<usize>,
}

pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>, // For each node, list of neighbors
    /// Angle of the column axis in image space, in `(-π/4, π/4]`.
    pub axis_angle: f32,
}

/// Dominant lattice direction from the 4-fold symmetric average of short
/// neighbour vectors. Diagonals are excluded by the distance cut.
fn estimate_axis_angle(
    corners: &[Corner],
    tree: &KdTree<f32, 2>,
    params: &GridGraphParams,
) -> Option<f32> {
    let (mut c4, mut s4) = (0.0f32, 0.0f32);

    for corner in corners {
        let query = [corner.position.x, corner.position.y];
        let results = tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1);

        let mut dists: Vec<(usize, f32)> = results
            .iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .filter(|&(_, d)| d >= params.min_spacing_pix)
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1));
        let Some(&(_, nearest)) = dists.first() else {
            continue;
        };

        for (idx, d) in dists {
            if d > 1.3 * nearest {
                break;
            }
            let e = corners[idx].position - corner.position;
            let theta = e.y.atan2(e.x);
            c4 += (4.0 * theta).cos();
            s4 += (4.0 * theta).sin();
        }
    }

    if c4.hypot(s4) < 1e-3 {
        return None;
    }
    Some(s4.atan2(c4) / 4.0)
}

/// Assign an edge to one of the four grid directions; returns the direction
/// and its angular deviation from the ideal axis.
fn classify_direction(
    e: Vector2<f32>,
    u: Vector2<f32>,
    v: Vector2<f32>,
    tol: f32,
) -> Option<(NeighborDirection, f32)> {
    let a = e.dot(&v).atan2(e.dot(&u));
    let candidates = [
        (NeighborDirection::Right, a.abs()),
        (NeighborDirection::Down, (a - FRAC_PI_2).abs()),
        (NeighborDirection::Left, PI - a.abs()),
        (NeighborDirection::Up, (a + FRAC_PI_2).abs()),
    ];
    candidates
        .into_iter()
        .filter(|&(_, dev)| dev <= tol)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates.into_iter() {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Result<Self, GridError> {
        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let axis_angle = estimate_axis_angle(corners, &tree, params).ok_or(GridError::NoAxes)?;
        let u = Vector2::new(axis_angle.cos(), axis_angle.sin());
        let v = Vector2::new(-axis_angle.sin(), axis_angle.cos());
        let tol = params.direction_tolerance_deg.to_radians();

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let results = tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1);

            let nearest = results
                .iter()
                .filter(|nn| nn.item as usize != i)
                .map(|nn| nn.distance.sqrt())
                .filter(|&d| d >= params.min_spacing_pix)
                .fold(f32::INFINITY, f32::min);
            if !nearest.is_finite() {
                neighbors.push(Vec::new());
                continue;
            }
            let max_distance = params.max_spacing_ratio * nearest;

            let mut candidates = Vec::new();
            for nn in results {
                let neighbor_index = nn.item as usize;
                if neighbor_index == i {
                    continue; // Skip self
                }
                let distance = nn.distance.sqrt();
                if distance < params.min_spacing_pix || distance > max_distance {
                    continue;
                }
                let e = corners[neighbor_index].position - corner.position;
                if let Some((direction, deviation)) = classify_direction(e, u, v, tol) {
                    candidates.push(NodeNeighbor {
                        direction,
                        index: neighbor_index,
                        distance,
                        score: distance / nearest + deviation,
                    });
                }
            }

            neighbors.push(select_neighbors(candidates));
        }

        // Keep an edge only when the far node points straight back.
        let keep: Vec<Vec<bool>> = neighbors
            .iter()
            .enumerate()
            .map(|(a, list)| {
                list.iter()
                    .map(|n| {
                        neighbors[n.index]
                            .iter()
                            .any(|back| back.index == a && back.direction == n.direction.opposite())
                    })
                    .collect()
            })
            .collect();
        for (list, flags) in neighbors.iter_mut().zip(keep) {
            let mut flags = flags.into_iter();
            list.retain(|_| flags.next().unwrap_or(false));
        }

        Ok(Self {
            neighbors,
            axis_angle,
        })
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS labelling of one component. Fails when two corners claim the same
/// coordinates or an edge disagrees with the labels of its ends.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Result<HashMap<usize, GridCoords>, GridError> {
    let mut coords: HashMap<usize, GridCoords> = HashMap::with_capacity(component.len());
    let Some(&start) = component.first() else {
        return Ok(coords);
    };

    let mut queue = VecDeque::new();
    coords.insert(start, GridCoords { i: 0, j: 0 });
    queue.push_back(start);

    while let Some(node_idx) = queue.pop_front() {
        let here = coords[&node_idx];
        for neighbor in &graph.neighbors[node_idx] {
            let (di, dj) = neighbor.direction.delta();
            let expected = GridCoords {
                i: here.i + di,
                j: here.j + dj,
            };
            match coords.get(&neighbor.index) {
                Some(&seen) if seen != expected => return Err(GridError::InconsistentTopology),
                Some(_) => {}
                None => {
                    coords.insert(neighbor.index, expected);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let mut occupied = HashMap::with_capacity(coords.len());
    for (&idx, &gc) in &coords {
        if occupied.insert(gc, idx).is_some() {
            return Err(GridError::InconsistentTopology);
        }
    }

    Ok(coords)
}

/// Locate a complete `cols × rows` grid in a corner cloud.
///
/// When the largest component spans more than the requested grid (e.g. weak
/// T-junctions on the board border), the fully occupied window with the
/// highest total corner strength wins.
pub fn assemble_grid(
    corners: &[Corner],
    cols: u32,
    rows: u32,
    params: &GridGraphParams,
) -> Result<GridMatch, GridError> {
    let needed = cols as usize * rows as usize;
    if corners.len() < needed {
        return Err(GridError::TooFewCorners {
            needed,
            got: corners.len(),
        });
    }

    let graph = GridGraph::new(corners, params)?;
    let components = connected_components(&graph);
    let largest = components
        .iter()
        .max_by_key(|c| c.len())
        .ok_or(GridError::TooFewCorners { needed, got: 0 })?;
    log::debug!(
        "grid graph: {} corners, {} components, largest {}, axis {:.1}°",
        corners.len(),
        components.len(),
        largest.len(),
        graph.axis_angle.to_degrees()
    );

    if largest.len() < needed {
        return Err(GridError::TooFewCorners {
            needed,
            got: largest.len(),
        });
    }

    let coords = assign_grid_coordinates(&graph, largest)?;
    let by_coords: HashMap<GridCoords, usize> = coords.iter().map(|(&k, &v)| (v, k)).collect();

    let min_i = coords.values().map(|c| c.i).min().unwrap_or(0);
    let max_i = coords.values().map(|c| c.i).max().unwrap_or(0);
    let min_j = coords.values().map(|c| c.j).min().unwrap_or(0);
    let max_j = coords.values().map(|c| c.j).max().unwrap_or(0);
    let (w, h) = (cols as i32, rows as i32);

    let mut best: Option<(f32, Vec<usize>)> = None;
    for j0 in min_j..=(max_j - h + 1) {
        for i0 in min_i..=(max_i - w + 1) {
            let window: Option<Vec<usize>> = (0..h)
                .flat_map(|dj| (0..w).map(move |di| (i0 + di, j0 + dj)))
                .map(|(i, j)| by_coords.get(&GridCoords { i, j }).copied())
                .collect();
            let Some(indices) = window else {
                continue;
            };
            let strength: f32 = indices.iter().map(|&k| corners[k].strength).sum();
            if best.as_ref().is_none_or(|(s, _)| strength > *s) {
                best = Some((strength, indices));
            }
        }
    }

    match best {
        Some((_, corner_indices)) => Ok(GridMatch {
            cols,
            rows,
            corner_indices,
        }),
        None => Err(GridError::Incomplete {
            cols: (max_i - min_i + 1) as u32,
            rows: (max_j - min_j + 1) as u32,
            expected_cols: cols,
            expected_rows: rows,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Point2, Vector3};

    fn make_corner(x: f32, y: f32) -> Corner {
        Corner::new(x, y, 1.0)
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    fn lattice(cols: usize, rows: usize, map: impl Fn(f32, f32) -> (f32, f32)) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let (x, y) = map(i as f32, j as f32);
                corners.push(make_corner(x, y));
            }
        }
        corners
    }

    fn assert_row_major(found: &GridMatch, cols: usize) {
        for (k, &idx) in found.corner_indices.iter().enumerate() {
            assert_eq!(idx, k, "slot ({}, {})", k % cols, k / cols);
        }
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let spacing = 10.0;
        let cols = 3;
        let corners = lattice(cols, 3, |i, j| (i * spacing, j * spacing));
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).unwrap();

        let idx = |i: usize, j: usize| j * cols + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);
        for n in center.values() {
            assert!((n.distance - spacing).abs() < 1e-4);
        }

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn keeps_nearest_candidate_per_direction() {
        let corners = lattice(5, 1, |i, _| (i * 10.0, 0.0))
            .into_iter()
            .chain(lattice(5, 1, |i, _| (i * 10.0, 10.0)))
            .collect::<Vec<_>>();
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).unwrap();

        let map = neighbor_map(&graph.neighbors[2]);
        assert_eq!(1, map[&NeighborDirection::Left].index);
        assert_eq!(3, map[&NeighborDirection::Right].index);
        assert_eq!(7, map[&NeighborDirection::Down].index);
    }

    #[test]
    fn regular_grid_is_labelled_row_major() {
        let corners = lattice(9, 6, |i, j| (50.0 + 30.0 * i, 40.0 + 30.0 * j));
        let found = assemble_grid(&corners, 9, 6, &GridGraphParams::default()).unwrap();
        assert_eq!(found.corner_indices.len(), 54);
        assert_row_major(&found, 9);
    }

    #[test]
    fn rotated_grid_keeps_column_axis_nearest_image_x() {
        let (s, c) = 30f32.to_radians().sin_cos();
        let corners = lattice(9, 6, |i, j| {
            let (x, y) = (25.0 * i, 25.0 * j);
            (300.0 + c * x - s * y, 100.0 + s * x + c * y)
        });
        let found = assemble_grid(&corners, 9, 6, &GridGraphParams::default()).unwrap();
        assert_row_major(&found, 9);
    }

    #[test]
    fn perspective_grid_is_assembled() {
        let h = Matrix3::new(
            1.0, 0.05, 100.0, //
            0.02, 1.0, 80.0, //
            0.0006, 0.0004, 1.0,
        );
        let corners = lattice(9, 6, |i, j| {
            let p = h * Vector3::new(30.0 * i as f64, 30.0 * j as f64, 1.0);
            ((p.x / p.z) as f32, (p.y / p.z) as f32)
        });
        let found = assemble_grid(&corners, 9, 6, &GridGraphParams::default()).unwrap();
        assert_row_major(&found, 9);
    }

    #[test]
    fn missing_corner_is_incomplete() {
        // Enough corners overall, but the hole at (4, 2) lies in every 9 × 6 window.
        let mut corners = lattice(10, 6, |i, j| (30.0 * i, 30.0 * j));
        corners.remove(2 * 10 + 4);
        let err = assemble_grid(&corners, 9, 6, &GridGraphParams::default()).unwrap_err();
        assert_eq!(
            err,
            GridError::Incomplete {
                cols: 10,
                rows: 6,
                expected_cols: 9,
                expected_rows: 6
            }
        );
    }

    #[test]
    fn transposed_grid_is_rejected() {
        let corners = lattice(6, 9, |i, j| (30.0 * i, 30.0 * j));
        let err = assemble_grid(&corners, 9, 6, &GridGraphParams::default()).unwrap_err();
        assert_eq!(
            err,
            GridError::Incomplete {
                cols: 6,
                rows: 9,
                expected_cols: 9,
                expected_rows: 6
            }
        );
        assert!(assemble_grid(&corners, 6, 9, &GridGraphParams::default()).is_ok());
    }

    #[test]
    fn strongest_window_wins_over_weak_border_row() {
        let mut corners = lattice(4, 3, |i, j| (30.0 * i, 30.0 * (j + 1.0)));
        for i in 0..4 {
            corners.push(Corner::new(30.0 * i as f32, 0.0, 0.2));
        }
        let found = assemble_grid(&corners, 4, 3, &GridGraphParams::default()).unwrap();
        assert_row_major(&found, 4);
    }

    #[test]
    fn far_clutter_does_not_disturb_the_board() {
        let mut corners = lattice(5, 4, |i, j| (30.0 * i, 30.0 * j));
        corners.push(make_corner(800.0, 800.0));
        corners.push(make_corner(805.0, 900.0));
        let found = assemble_grid(&corners, 5, 4, &GridGraphParams::default()).unwrap();
        assert_row_major(&found, 5);
        let p: Point2<f32> = corners[found.corner_indices[6]].position;
        assert_eq!(p, Point2::new(30.0, 30.0));
    }

    #[test]
    fn too_few_corners_fail_early() {
        let corners = lattice(3, 3, |i, j| (10.0 * i, 10.0 * j));
        assert_eq!(
            assemble_grid(&corners, 9, 6, &GridGraphParams::default()),
            Err(GridError::TooFewCorners { needed: 54, got: 9 })
        );
    }
}
