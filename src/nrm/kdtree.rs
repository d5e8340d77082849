// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! A minimal static 3D k-d tree, built once per [`super::compute_normals`]
//! pass and queried once per vertex.
//!
//! No crate in the teacher's stack or the rest of the pack offers k-nearest-
//! neighbour search; rather than pull in an unaligned dependency for one
//! leaf query, this is hand-rolled in the same register as
//! [`crate::topo::delaunay`] (see DESIGN.md).

/// A balanced-by-construction k-d tree over `(point, payload)` pairs, built
/// once from a full point set via recursive median splitting.
pub struct KdTree<T> {
    nodes: Vec<Node<T>>,
}

struct Node<T> {
    point: (f64, f64, f64),
    payload: T,
    axis: u8,
    left: Option<usize>,
    right: Option<usize>,
}

impl<T: Copy> KdTree<T> {
    /// Builds a tree over `items`. `O(n log n)` via repeated median
    /// partitioning on the axis of greatest spread at each level.
    pub fn build(items: Vec<((f64, f64, f64), T)>) -> Self {
        let mut nodes = Vec::with_capacity(items.len());
        let mut indices: Vec<usize> = (0..items.len()).collect();
        let root = Self::build_recursive(&items, &mut indices, &mut nodes);
        let _ = root;
        Self { nodes }
    }

    fn build_recursive(items: &[((f64, f64, f64), T)], indices: &mut [usize], nodes: &mut Vec<Node<T>>) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let axis = widest_axis(items, indices);
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| coord(items[a].0, axis).partial_cmp(&coord(items[b].0, axis)).unwrap());
        let (left_idx, rest) = indices.split_at_mut(mid);
        let (median, right_idx) = rest.split_first_mut().unwrap();
        let (point, payload) = items[*median];

        let left = Self::build_recursive(items, left_idx, nodes);
        let right = Self::build_recursive(items, right_idx, nodes);

        nodes.push(Node {
            point,
            payload,
            axis,
            left,
            right,
        });
        Some(nodes.len() - 1)
    }

    /// Returns the `k` nearest neighbours to `query` by Euclidean distance,
    /// nearest first, excluding any point exactly equal to `query`'s own
    /// payload comparison is the caller's job (pass `exclude` to skip one
    /// payload, typically the query vertex itself).
    pub fn k_nearest(&self, query: (f64, f64, f64), k: usize, exclude: impl Fn(&T) -> bool) -> Vec<T> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }
        let root = self.nodes.len() - 1;
        let mut heap: std::collections::BinaryHeap<HeapEntry<T>> = std::collections::BinaryHeap::new();
        self.search(root, query, k, &exclude, &mut heap);
        let mut results: Vec<(f64, T)> = heap.into_iter().map(|e| (e.dist2, e.payload)).collect();
        results.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        results.into_iter().map(|(_, payload)| payload).collect()
    }

    fn search(&self, node_index: usize, query: (f64, f64, f64), k: usize, exclude: &impl Fn(&T) -> bool, heap: &mut std::collections::BinaryHeap<HeapEntry<T>>) {
        let node = &self.nodes[node_index];
        let d2 = dist2(node.point, query);
        if !exclude(&node.payload) {
            if heap.len() < k {
                heap.push(HeapEntry { dist2: d2, payload: node.payload });
            } else if let Some(worst) = heap.peek() {
                if d2 < worst.dist2 {
                    heap.pop();
                    heap.push(HeapEntry { dist2: d2, payload: node.payload });
                }
            }
        }

        let diff = coord(query, node.axis) - coord(node.point, node.axis);
        let (near, far) = if diff <= 0.0 { (node.left, node.right) } else { (node.right, node.left) };
        if let Some(near) = near {
            self.search(near, query, k, exclude, heap);
        }
        let worst_dist2 = if heap.len() < k { f64::INFINITY } else { heap.peek().map(|e| e.dist2).unwrap_or(f64::INFINITY) };
        if diff * diff < worst_dist2 {
            if let Some(far) = far {
                self.search(far, query, k, exclude, heap);
            }
        }
    }
}

struct HeapEntry<T> {
    dist2: f64,
    payload: T,
}
impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2
    }
}
impl<T> Eq for HeapEntry<T> {}
impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // max-heap on distance so `peek`/`pop` evict the current farthest
        // candidate once `k` entries are held.
        self.dist2.partial_cmp(&other.dist2).unwrap_or(std::cmp::Ordering::Equal)
    }
}

fn coord(p: (f64, f64, f64), axis: u8) -> f64 {
    match axis {
        0 => p.0,
        1 => p.1,
        _ => p.2,
    }
}

fn dist2(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)
}

fn widest_axis<T>(items: &[((f64, f64, f64), T)], indices: &[usize]) -> u8 {
    let mut min = (f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &i in indices {
        let p = items[i].0;
        min.0 = min.0.min(p.0);
        min.1 = min.1.min(p.1);
        min.2 = min.2.min(p.2);
        max.0 = max.0.max(p.0);
        max.1 = max.1.max(p.1);
        max.2 = max.2.max(p.2);
    }
    let spread = (max.0 - min.0, max.1 - min.1, max.2 - min.2);
    if spread.0 >= spread.1 && spread.0 >= spread.2 {
        0
    } else if spread.1 >= spread.2 {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_exact_nearest_neighbours_on_a_grid() {
        let mut items = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                items.push(((i as f64, j as f64, 0.0), (i, j)));
            }
        }
        let tree = KdTree::build(items);
        let nearest = tree.k_nearest((2.0, 2.0, 0.0), 5, |&(i, j)| i == 2 && j == 2);
        assert_eq!(nearest.len(), 4);
        for (i, j) in nearest {
            let d2 = (i as f64 - 2.0).powi(2) + (j as f64 - 2.0).powi(2);
            assert!((d2 - 1.0).abs() < 1e-9, "expected a 4-neighbour, got ({i},{j})");
        }
    }

    #[test]
    fn k_larger_than_tree_returns_everything_available() {
        let items = vec![((0.0, 0.0, 0.0), 0), ((1.0, 0.0, 0.0), 1)];
        let tree = KdTree::build(items);
        let nearest = tree.k_nearest((0.0, 0.0, 0.0), 50, |_| false);
        assert_eq!(nearest.len(), 2);
    }
}
