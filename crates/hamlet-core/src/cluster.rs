//! Seeded k-means clustering of building points into hamlets
//!
//! Lloyd's algorithm over planar coordinates:
//! - k-means++ initialization from a seeded ChaCha8 stream
//! - assign each point to its nearest centroid (lowest cluster id on ties)
//! - move each centroid to the mean of its members
//! - stop when no centroid moves more than `tolerance`, when no assignment
//!   changes, or at `max_iterations`
//!
//! Empty clusters keep their previous centroid. They are not reseeded, so
//! `K > N` produces empty clusters instead of looping.

use geo::Coord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{HamletError, Result};
use crate::types::ClusterId;

/// Average households per reference hamlet
pub const DEFAULT_REFERENCE_RATIO: f64 = 51.0;

/// Iteration bound for Lloyd's algorithm
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Centroid shift (in coordinate units) below which clustering has converged
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

pub const DEFAULT_SEED: u64 = 42;

/// Number of hamlets for `n` points: `round(n / ratio)`, at least 1
pub fn target_cluster_count(n: usize, ratio: f64) -> Result<usize> {
    if n == 0 {
        return Err(HamletError::InputCardinality {
            found: 0,
            required: 1,
        });
    }
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(HamletError::InvalidConfig(format!(
            "reference ratio must be finite and > 0, got {ratio}"
        )));
    }
    let k = (n as f64 / ratio).round() as usize;
    Ok(k.max(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub k: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl ClusterConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Partition produced by [`KMeans::fit`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult {
    /// Cluster of each input point, in input order
    pub assignments: Vec<ClusterId>,
    /// K centroids, indexed by `ClusterId::index`
    pub centroids: Vec<Coord<f64>>,
    /// Member count per cluster; sums to the number of points
    pub sizes: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
    /// Largest centroid movement in the final iteration
    pub max_shift: f64,
    /// Sum of squared distances from points to their centroids
    pub inertia: f64,
}

impl ClusterResult {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn empty_clusters(&self) -> Vec<ClusterId> {
        self.sizes
            .iter()
            .enumerate()
            .filter(|(_, size)| **size == 0)
            .map(|(i, _)| ClusterId::from_index(i))
            .collect()
    }
}

pub struct KMeans {
    config: ClusterConfig,
}

impl KMeans {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, points: &[Coord<f64>]) -> Result<ClusterResult> {
        let k = self.config.k;
        if points.is_empty() {
            return Err(HamletError::InputCardinality {
                found: 0,
                required: 1,
            });
        }
        if k == 0 {
            return Err(HamletError::InvalidConfig(
                "cluster count must be at least 1".to_string(),
            ));
        }
        if !self.config.tolerance.is_finite() || self.config.tolerance < 0.0 {
            return Err(HamletError::InvalidConfig(format!(
                "tolerance must be finite and >= 0, got {}",
                self.config.tolerance
            )));
        }
        if k > points.len() {
            tracing::warn!(
                k,
                points = points.len(),
                "More clusters than points; some clusters will be empty"
            );
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut centroids = initialize_centroids(points, k, &mut rng);
        let mut assignments = assign(points, &centroids);
        let mut iterations = 0;
        let mut max_shift = f64::INFINITY;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let updated = recompute_centroids(points, &assignments, &centroids);
            max_shift = centroids
                .iter()
                .zip(updated.iter())
                .map(|(a, b)| squared_distance(*a, *b).sqrt())
                .fold(0.0, f64::max);
            centroids = updated;

            let reassigned = assign(points, &centroids);
            let changed = reassigned
                .iter()
                .zip(assignments.iter())
                .filter(|(a, b)| a != b)
                .count();
            assignments = reassigned;

            tracing::debug!(iteration = iterations, max_shift, changed, "k-means iteration");

            if max_shift <= self.config.tolerance || changed == 0 {
                converged = true;
                break;
            }
        }

        // Reported centroids are the member means of the final assignment
        centroids = recompute_centroids(points, &assignments, &centroids);

        let mut sizes = vec![0usize; k];
        for &c in &assignments {
            sizes[c] += 1;
        }
        let inertia: f64 = points
            .iter()
            .zip(assignments.iter())
            .map(|(p, &c)| squared_distance(*p, centroids[c]))
            .sum();

        if converged {
            tracing::info!(k, iterations, inertia, "k-means converged");
        } else {
            tracing::warn!(
                k,
                iterations,
                max_shift,
                "k-means reached the iteration bound without converging"
            );
        }

        Ok(ClusterResult {
            assignments: assignments.into_iter().map(ClusterId::from_index).collect(),
            centroids,
            sizes,
            iterations,
            converged,
            max_shift,
            inertia,
        })
    }
}

fn squared_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Index of the nearest centroid; strict `<` keeps the lowest index on ties
fn nearest(point: Coord<f64>, centroids: &[Coord<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let dist = squared_distance(point, *c);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn assign(points: &[Coord<f64>], centroids: &[Coord<f64>]) -> Vec<usize> {
    points.iter().map(|p| nearest(*p, centroids)).collect()
}

fn recompute_centroids(
    points: &[Coord<f64>],
    assignments: &[usize],
    previous: &[Coord<f64>],
) -> Vec<Coord<f64>> {
    let k = previous.len();
    let mut sums = vec![Coord { x: 0.0, y: 0.0 }; k];
    let mut counts = vec![0usize; k];

    for (point, &cluster) in points.iter().zip(assignments.iter()) {
        sums[cluster].x += point.x;
        sums[cluster].y += point.y;
        counts[cluster] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous.iter())
        .map(|((sum, count), prev)| {
            if count > 0 {
                Coord {
                    x: sum.x / count as f64,
                    y: sum.y / count as f64,
                }
            } else {
                *prev
            }
        })
        .collect()
}

/// k-means++ selection: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one
fn initialize_centroids(points: &[Coord<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Coord<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);

    let mut distances: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(*p, centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = distances.iter().sum();
        let next = if total > 0.0 {
            let threshold = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut chosen = None;
            for (i, &dist) in distances.iter().enumerate() {
                cumsum += dist;
                if dist > 0.0 && cumsum >= threshold {
                    chosen = Some(i);
                    break;
                }
            }
            // Rounding can leave the threshold just past the last cumulative sum
            chosen.unwrap_or_else(|| {
                distances
                    .iter()
                    .rposition(|&d| d > 0.0)
                    .unwrap_or(points.len() - 1)
            })
        } else {
            // Every point coincides with a chosen centroid
            rng.random_range(0..points.len())
        };

        let centroid = points[next];
        centroids.push(centroid);
        for (dist, p) in distances.iter_mut().zip(points.iter()) {
            *dist = dist.min(squared_distance(*p, centroid));
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic grid of blobs around the given centers
    fn blobs(centers: &[(f64, f64)], per_blob: usize) -> Vec<Coord<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        centers
            .iter()
            .flat_map(|&(cx, cy)| {
                (0..per_blob)
                    .map(|_| Coord {
                        x: cx + rng.random::<f64>() - 0.5,
                        y: cy + rng.random::<f64>() - 0.5,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_target_cluster_count() {
        assert_eq!(target_cluster_count(510, 51.0).unwrap(), 10);
        assert_eq!(target_cluster_count(536, 51.0).unwrap(), 11);
        assert_eq!(target_cluster_count(534, 51.0).unwrap(), 10);
    }

    #[test]
    fn test_target_cluster_count_clamps_to_one() {
        assert_eq!(target_cluster_count(10, 51.0).unwrap(), 1);
        assert_eq!(target_cluster_count(1, 51.0).unwrap(), 1);
    }

    #[test]
    fn test_target_cluster_count_errors() {
        assert!(matches!(
            target_cluster_count(0, 51.0),
            Err(HamletError::InputCardinality { found: 0, .. })
        ));
        assert!(matches!(
            target_cluster_count(10, 0.0),
            Err(HamletError::InvalidConfig(_))
        ));
        assert!(matches!(
            target_cluster_count(10, f64::NAN),
            Err(HamletError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_separates_well_spaced_blobs() {
        let centers = [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)];
        let points = blobs(&centers, 30);
        let result = KMeans::new(ClusterConfig::new(3)).fit(&points).unwrap();

        assert!(result.converged);
        assert_eq!(result.sizes.iter().sum::<usize>(), 90);
        assert_eq!(result.sizes, vec![30, 30, 30]);

        // Every blob lands in exactly one cluster
        for blob in points.chunks(30).zip(result.assignments.chunks(30)) {
            let first = blob.1[0];
            assert!(blob.1.iter().all(|&c| c == first));
        }
    }

    #[test]
    fn test_deterministic_under_seed() {
        let points = blobs(&[(0.0, 0.0), (10.0, 10.0), (20.0, 0.0), (5.0, 30.0)], 25);
        let config = ClusterConfig::new(4).with_seed(1234);

        let a = KMeans::new(config.clone()).fit(&points).unwrap();
        let b = KMeans::new(config).fit(&points).unwrap();

        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.sizes, b.sizes);
    }

    #[test]
    fn test_assignment_ids_start_at_one() {
        let points = blobs(&[(0.0, 0.0), (50.0, 50.0)], 10);
        let result = KMeans::new(ClusterConfig::new(2)).fit(&points).unwrap();
        assert!(result
            .assignments
            .iter()
            .all(|c| c.0 >= 1 && c.0 as usize <= 2));
    }

    #[test]
    fn test_centroids_are_member_means() {
        let points = blobs(&[(0.0, 0.0), (40.0, 0.0)], 20);
        let result = KMeans::new(ClusterConfig::new(2)).fit(&points).unwrap();

        for (i, centroid) in result.centroids.iter().enumerate() {
            let members: Vec<_> = points
                .iter()
                .zip(result.assignments.iter())
                .filter(|(_, c)| c.index() == i)
                .map(|(p, _)| *p)
                .collect();
            let mx = members.iter().map(|p| p.x).sum::<f64>() / members.len() as f64;
            let my = members.iter().map(|p| p.y).sum::<f64>() / members.len() as f64;
            assert!((centroid.x - mx).abs() < 1e-9);
            assert!((centroid.y - my).abs() < 1e-9);
        }
    }

    #[test]
    fn test_centroids_are_member_means_with_loose_tolerance() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let points: Vec<Coord<f64>> = (0..300)
            .map(|_| Coord {
                x: rng.random::<f64>() * 100.0,
                y: rng.random::<f64>() * 100.0,
            })
            .collect();
        let config = ClusterConfig {
            tolerance: 5.0,
            ..ClusterConfig::new(6)
        };
        let result = KMeans::new(config).fit(&points).unwrap();

        for (i, centroid) in result.centroids.iter().enumerate() {
            let members: Vec<_> = points
                .iter()
                .zip(result.assignments.iter())
                .filter(|(_, c)| c.index() == i)
                .map(|(p, _)| *p)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mx = members.iter().map(|p| p.x).sum::<f64>() / members.len() as f64;
            let my = members.iter().map(|p| p.y).sum::<f64>() / members.len() as f64;
            assert!((centroid.x - mx).abs() < 1e-9, "cluster {i} x");
            assert!((centroid.y - my).abs() < 1e-9, "cluster {i} y");
        }
    }

    #[test]
    fn test_more_clusters_than_points() {
        let points = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }];
        let result = KMeans::new(ClusterConfig::new(5)).fit(&points).unwrap();

        assert_eq!(result.k(), 5);
        assert_eq!(result.sizes.iter().sum::<usize>(), 2);
        assert_eq!(result.empty_clusters().len(), 3);
    }

    #[test]
    fn test_identical_points_tie_to_lowest_cluster() {
        let points = vec![Coord { x: 3.0, y: 3.0 }; 6];
        let result = KMeans::new(ClusterConfig::new(3)).fit(&points).unwrap();

        assert!(result.assignments.iter().all(|&c| c == ClusterId(1)));
        assert_eq!(result.sizes, vec![6, 0, 0]);
        assert_eq!(result.inertia, 0.0);
    }

    #[test]
    fn test_iteration_bound_reports_non_convergence() {
        let points = blobs(&[(0.0, 0.0), (3.0, 0.0), (6.0, 0.0), (9.0, 0.0)], 40);
        let mut config = ClusterConfig::new(7);
        config.max_iterations = 1;
        config.tolerance = 0.0;
        let result = KMeans::new(config).fit(&points).unwrap();

        assert_eq!(result.iterations, 1);
        if !result.converged {
            assert!(result.max_shift > 0.0);
        }
        assert_eq!(result.sizes.iter().sum::<usize>(), points.len());
    }

    #[test]
    fn test_zero_iterations_returns_initial_partition() {
        let points = blobs(&[(0.0, 0.0), (10.0, 0.0)], 5);
        let mut config = ClusterConfig::new(2);
        config.max_iterations = 0;
        let result = KMeans::new(config).fit(&points).unwrap();

        assert_eq!(result.iterations, 0);
        assert!(!result.converged);
        assert_eq!(result.sizes.iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let err = KMeans::new(ClusterConfig::new(1)).fit(&[]).unwrap_err();
        assert!(matches!(err, HamletError::InputCardinality { .. }));
    }

    #[test]
    fn test_fit_rejects_zero_k() {
        let err = KMeans::new(ClusterConfig::new(0))
            .fit(&[Coord { x: 0.0, y: 0.0 }])
            .unwrap_err();
        assert!(matches!(err, HamletError::InvalidConfig(_)));
    }
}
