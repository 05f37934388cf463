//! Single-column isolation forest for anomaly flagging.
//!
//! Builds an ensemble of isolation trees over random subsamples; points that
//! isolate in fewer random splits score closer to 1. The RNG is a seeded LCG
//! so detection is reproducible across runs.
//!
//! Reference: Liu, Ting & Zhou (2008), "Isolation Forest", ICDM.

/// Tunables for the forest. Defaults follow the reference implementation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationForestOptions {
    /// Number of isolation trees.
    pub n_trees: usize,
    /// Subsample size per tree; 0 selects min(256, n).
    pub max_samples: usize,
    /// Expected anomaly fraction, used for the score cutoff.
    pub contamination: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for IsolationForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 0,
            contamination: 0.1,
            seed: 42,
        }
    }
}

enum Node {
    Internal { split: f64, left: Box<Node>, right: Box<Node> },
    External { size: usize },
}

/// Anomaly scores in [0, 1], one per input value. Fewer than two values score
/// 0.5 (no isolation structure to measure).
pub fn anomaly_scores(xs: &[f64], opts: &IsolationForestOptions) -> Vec<f64> {
    let n = xs.len();
    if n < 2 || opts.n_trees == 0 {
        return vec![0.5; n];
    }
    let max_samples = if opts.max_samples == 0 {
        n.min(256)
    } else {
        opts.max_samples.min(n)
    };
    let max_depth = (max_samples as f64).log2().ceil() as usize;

    let mut rng = opts.seed;
    let mut trees = Vec::with_capacity(opts.n_trees);
    for _ in 0..opts.n_trees {
        let indices = sample_indices(n, max_samples, &mut rng);
        let subsample: Vec<f64> = indices.iter().map(|&i| xs[i]).collect();
        trees.push(build_tree(&subsample, max_depth, &mut rng));
    }

    let cn = c_factor(max_samples);
    xs.iter()
        .map(|&x| {
            let avg_path: f64 =
                trees.iter().map(|t| path_length(x, t, 0)).sum::<f64>() / opts.n_trees as f64;
            if cn > 0.0 {
                2.0f64.powf(-avg_path / cn)
            } else {
                0.5
            }
        })
        .collect()
}

/// Flag the points whose score exceeds the contamination-quantile cutoff.
pub fn anomaly_flags(xs: &[f64], opts: &IsolationForestOptions) -> Vec<bool> {
    let scores = anomaly_scores(xs, opts);
    if scores.is_empty() {
        return Vec::new();
    }
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let k = ((xs.len() as f64 * opts.contamination).ceil() as usize)
        .clamp(1, xs.len());
    let threshold = sorted[k - 1];
    // A flat score distribution (e.g. uniform data) would flag everything at
    // the quantile; require strictly anomalous scores in that case.
    if sorted[0] <= threshold + f64::EPSILON && sorted[sorted.len() - 1] >= threshold - f64::EPSILON
    {
        return vec![false; xs.len()];
    }
    scores.iter().map(|&s| s >= threshold).collect()
}

fn build_tree(data: &[f64], max_depth: usize, rng: &mut u64) -> Node {
    let n = data.len();
    if n <= 1 || max_depth == 0 {
        return Node::External { size: n };
    }
    let mut min_val = f64::INFINITY;
    let mut max_val = f64::NEG_INFINITY;
    for &v in data {
        min_val = min_val.min(v);
        max_val = max_val.max(v);
    }
    if (max_val - min_val).abs() < 1e-15 {
        return Node::External { size: n };
    }
    let split = min_val + lcg_next_f64(rng) * (max_val - min_val);
    let (left_data, right_data): (Vec<f64>, Vec<f64>) = data.iter().copied().partition(|&v| v < split);
    if left_data.is_empty() || right_data.is_empty() {
        return Node::External { size: n };
    }
    Node::Internal {
        split,
        left: Box::new(build_tree(&left_data, max_depth - 1, rng)),
        right: Box::new(build_tree(&right_data, max_depth - 1, rng)),
    }
}

fn path_length(x: f64, node: &Node, depth: usize) -> f64 {
    match node {
        Node::External { size } => depth as f64 + c_factor(*size),
        Node::Internal { split, left, right } => {
            if x < *split {
                path_length(x, left, depth + 1)
            } else {
                path_length(x, right, depth + 1)
            }
        }
    }
}

/// Average path length of unsuccessful BST search: c(n) = 2H(n−1) − 2(n−1)/n.
fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    if n == 2 {
        return 1.0;
    }
    let n_f = n as f64;
    let harmonic = (n_f - 1.0).ln() + 0.577_215_664_9;
    2.0 * harmonic - 2.0 * (n_f - 1.0) / n_f
}

fn lcg_next_f64(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 33) as f64 / (1u64 << 31) as f64
}

fn lcg_next_usize(state: &mut u64, max: usize) -> usize {
    (lcg_next_f64(state) * max as f64) as usize % max
}

fn sample_indices(n: usize, k: usize, rng: &mut u64) -> Vec<usize> {
    let k = k.min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = i + lcg_next_usize(rng, n - i);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}
