//! Semantic stage: cosine similarity against cached prototype centroids.
//!
//! Prototypes and the utterance's embedding are assumed pre-computed to a
//! fixed dimension by whatever embedding model `router.prototypes` was built
//! with. The embedding step itself is outside this module's contract; it is
//! supplied via [`SemanticStage::with_embedder`] so the matching logic can be
//! exercised in tests without a real model.

use super::Tier;

/// A cached prototype centroid for one tier.
#[derive(Debug, Clone)]
pub struct Prototype {
    pub tier: Tier,
    pub centroid: Vec<f32>,
}

/// Result of the semantic stage.
#[derive(Debug, Clone, Copy)]
pub struct SemanticResult {
    pub tier: Tier,
    pub confidence: f32,
}

/// Turns text into a fixed-dimension embedding. A production implementation
/// wraps a small sentence-embedding model; [`HashEmbedder`] is a
/// dependency-free stand-in used for tests and as a default.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic bag-of-words hashing embedder. Not semantically meaningful,
/// but stable and dependency-free — enough to exercise the cosine-similarity
/// matching logic end-to-end.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let hash = fnv1a(token.as_bytes());
            let idx = (hash as usize) % self.dims;
            vector[idx] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Margin within which the top two candidates are considered tied.
const DEFAULT_TIE_EPSILON: f32 = 0.03;

/// Cosine-similarity classifier over cached prototype centroids.
pub struct SemanticStage {
    prototypes: Vec<Prototype>,
    embedder: Box<dyn Embedder>,
    tie_epsilon: f32,
}

impl SemanticStage {
    pub fn new(prototypes: Vec<Prototype>) -> Self {
        Self::with_embedder(prototypes, Box::new(HashEmbedder::default()))
    }

    pub fn with_embedder(prototypes: Vec<Prototype>, embedder: Box<dyn Embedder>) -> Self {
        Self {
            prototypes,
            embedder,
            tie_epsilon: DEFAULT_TIE_EPSILON,
        }
    }

    pub fn with_tie_epsilon(mut self, tie_epsilon: f32) -> Self {
        self.tie_epsilon = tie_epsilon;
        self
    }

    /// Classify by nearest prototype centroid. Returns `None` when no
    /// prototypes are loaded (caller falls back to the default decision).
    pub fn classify(&self, text: &str) -> Option<SemanticResult> {
        if self.prototypes.is_empty() {
            return None;
        }
        let embedding = self.embedder.embed(text);

        let mut scored: Vec<(Tier, f32)> = self
            .prototypes
            .iter()
            .map(|p| (p.tier, cosine_similarity(&embedding, &p.centroid)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (top_tier, top_sim) = scored[0];
        let tier = if scored.len() > 1 {
            let (_, second_sim) = scored[1];
            if (top_sim - second_sim).abs() <= self.tie_epsilon {
                top_tier.promote()
            } else {
                top_tier
            }
        } else {
            top_tier
        };

        // Map similarity (roughly [-1, 1], in practice [0, 1] for our
        // hashing embedder) linearly onto a confidence band of [0.3, 0.9].
        // The floor sits below the default abstain threshold (0.35) so a
        // weak match can actually trigger abstention instead of the band
        // floor masking it.
        let confidence = (0.3 + 0.6 * top_sim.clamp(0.0, 1.0)).clamp(0.3, 0.9);

        Some(SemanticResult { tier, confidence })
    }
}
