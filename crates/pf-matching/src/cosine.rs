use pf_core::Component;
use pf_core::Similarity;

/// Cosine similarity clamped to `[0, 1]`. Opposite-direction matches carry
/// no semantic value here, so negative dot products floor at zero.
pub fn cosine(a: &[Component], b: &[Component]) -> Similarity {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Cosine similarity of one query against many candidates.
pub fn batch_cosine(query: &[Component], candidates: &[Vec<Component>]) -> Vec<Similarity> {
    candidates.iter().map(|c| cosine(query, c)).collect()
}

/// Whether an answer is semantically related to its prompt. Used when
/// seeding corpora so off-topic answers never enter a snapshot.
pub fn on_topic(
    prompt_embedding: &[Component],
    answer_embedding: &[Component],
    threshold: Similarity,
) -> (bool, Similarity) {
    let similarity = cosine(prompt_embedding, answer_embedding);
    (similarity >= threshold, similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_or_mismatched_vectors_score_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[], &[]), 0.0);
    }

    #[test]
    fn on_topic_applies_threshold() {
        let prompt = vec![1.0, 0.0];
        let related = vec![0.9, 0.4];
        let unrelated = vec![0.1, 0.99];
        assert!(on_topic(&prompt, &related, 0.40).0);
        let (ok, sim) = on_topic(&prompt, &unrelated, 0.40);
        assert!(!ok);
        assert!(sim < 0.40);
    }

    #[test]
    fn batch_matches_singles() {
        let query = vec![1.0, 2.0, 3.0];
        let candidates = vec![vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0], vec![0.0, 0.0, 0.0]];
        let batch = batch_cosine(&query, &candidates);
        for (batch_sim, candidate) in batch.iter().zip(candidates.iter()) {
            assert_eq!(*batch_sim, cosine(&query, candidate));
        }
    }
}
