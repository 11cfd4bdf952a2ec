//! Deterministic local fallback for `embed` when no remote embedding endpoint is configured.
//!
//! A hash-bucket bag-of-words embedding — not semantically rich, but enough to
//! exercise cosine-similarity code paths without a network call, and fully
//! deterministic so tests don't depend on external services.

pub const EMBEDDING_DIM: usize = 256;

pub struct LocalEmbeddingProvider;

impl LocalEmbeddingProvider {
    pub fn embed(text: &str) -> Vec<f32> {
        let mut vec = vec![0f32; EMBEDDING_DIM];
        for token in text.to_ascii_lowercase().split_whitespace() {
            let bucket = fnv1a(token.as_bytes()) as usize % EMBEDDING_DIM;
            vec[bucket] += 1.0;
        }
        normalize(&mut vec);
        vec
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic() {
        let a = LocalEmbeddingProvider::embed("rust trading bot");
        let b = LocalEmbeddingProvider::embed("rust trading bot");
        assert_eq!(a, b);
    }

    #[test]
    fn identical_text_has_similarity_one() {
        let a = LocalEmbeddingProvider::embed("python was created in 1991");
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unrelated_text_has_lower_similarity() {
        let a = LocalEmbeddingProvider::embed("rust trading bot project");
        let b = LocalEmbeddingProvider::embed("cooking pasta recipe dinner");
        assert!(cosine_similarity(&a, &b) < 0.5);
    }
}
