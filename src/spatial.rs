// src/spatial.rs
//! Minkowski-family distances and a k-d tree for k-nearest-neighbour queries.

use crate::error::{ImputationError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric used by the nearest-neighbour imputer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// L1 (Manhattan) distance.
    Cityblock,
    /// L-infinity distance.
    Chebyshev,
    /// General Minkowski distance with exponent `p >= 1`.
    Minkowski(f64),
}

impl DistanceMetric {
    pub fn validate(&self) -> Result<()> {
        if let DistanceMetric::Minkowski(p) = *self {
            if !p.is_finite() || p < 1.0 {
                return Err(ImputationError::invalid_argument(
                    "metric",
                    format!("Minkowski exponent must be finite and >= 1, got {}", p),
                ));
            }
        }
        Ok(())
    }

    pub fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match *self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Cityblock => diffs.sum(),
            DistanceMetric::Chebyshev => diffs.fold(0.0, f64::max),
            DistanceMetric::Minkowski(p) => diffs.map(|d| d.powf(p)).sum::<f64>().powf(1.0 / p),
        }
    }
}

/// One result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row index of the point in the indexed matrix.
    pub index: usize,
    pub distance: f64,
}

/// Heap entry ordered by distance, then by tie-break rank (lower wins).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    rank: usize,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max heap: the worst candidate sits on top.
        self.distance
            .total_cmp(&other.distance)
            .then(self.rank.cmp(&other.rank))
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        indices: Vec<usize>,
    },
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

const LEAF_SIZE: usize = 16;

/// A k-d tree over the rows of a matrix.
///
/// Any Minkowski metric with `p >= 1` (and Chebyshev) is bounded below by the gap along a
/// single coordinate, so the same splitting-plane pruning is exact for all supported metrics.
#[derive(Debug)]
pub struct KdTree {
    points: Array2<f64>,
    metric: DistanceMetric,
    nodes: Vec<Node>,
    root: usize,
}

impl KdTree {
    /// Builds a tree whose points are the rows of `points`.
    pub fn build(points: ArrayView2<f64>, metric: DistanceMetric) -> Result<Self> {
        metric.validate()?;
        let points = points.as_standard_layout().into_owned();
        let mut nodes = Vec::new();
        let mut indices: Vec<usize> = (0..points.nrows()).collect();
        let root = build_node(&points, &mut indices, &mut nodes);
        Ok(Self {
            points,
            metric,
            nodes,
            root,
        })
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// The `k` points closest to `query`, nearest first.
    ///
    /// Ties in distance are broken in favour of `preferred` (typically the query's own index),
    /// then by ascending index, so the result is deterministic.
    pub fn nearest(&self, query: ArrayView1<f64>, k: usize, preferred: Option<usize>) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.search(self.root, query, k, preferred, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|candidate| Neighbor {
                index: candidate.index,
                distance: candidate.distance,
            })
            .collect()
    }

    fn search(
        &self,
        node_id: usize,
        query: ArrayView1<f64>,
        k: usize,
        preferred: Option<usize>,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        match &self.nodes[node_id] {
            Node::Leaf { indices } => {
                for &index in indices {
                    let candidate = Candidate {
                        distance: self.metric.distance(query, self.points.row(index)),
                        rank: if Some(index) == preferred { 0 } else { index + 1 },
                        index,
                    };
                    if heap.len() < k {
                        heap.push(candidate);
                    } else if let Some(worst) = heap.peek() {
                        if candidate < *worst {
                            heap.pop();
                            heap.push(candidate);
                        }
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let gap = query[*axis] - value;
                let (near, far) = if gap < 0.0 { (*left, *right) } else { (*right, *left) };
                self.search(near, query, k, preferred, heap);
                let must_visit_far = heap.len() < k
                    || heap
                        .peek()
                        .map_or(true, |worst| gap.abs() <= worst.distance || worst.distance.is_nan());
                if must_visit_far {
                    self.search(far, query, k, preferred, heap);
                }
            }
        }
    }
}

fn build_node(points: &Array2<f64>, indices: &mut [usize], nodes: &mut Vec<Node>) -> usize {
    if indices.len() <= LEAF_SIZE {
        nodes.push(Node::Leaf {
            indices: indices.to_vec(),
        });
        return nodes.len() - 1;
    }

    // Split on the coordinate with the widest spread.
    let mut best_axis = 0;
    let mut best_spread = 0.0;
    for axis in 0..points.ncols() {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = points[[i, axis]];
            (lo.min(v), hi.max(v))
        });
        let spread = hi - lo;
        if spread > best_spread {
            best_spread = spread;
            best_axis = axis;
        }
    }
    if best_spread <= 0.0 || !best_spread.is_finite() {
        nodes.push(Node::Leaf {
            indices: indices.to_vec(),
        });
        return nodes.len() - 1;
    }

    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        points[[a, best_axis]].total_cmp(&points[[b, best_axis]])
    });
    let value = points[[indices[mid], best_axis]];

    let (left_indices, right_indices) = indices.split_at_mut(mid);
    let left = build_node(points, left_indices, nodes);
    let right = build_node(points, right_indices, nodes);
    nodes.push(Node::Split {
        axis: best_axis,
        value,
        left,
        right,
    });
    nodes.len() - 1
}
