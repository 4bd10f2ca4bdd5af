//! Appearance similarity and match scoring

/// Appearance embedding of a detected person
pub type Descriptor = Vec<f32>;

/// Cosine similarity of two descriptors.
///
/// Mismatched lengths and zero-norm inputs score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (&x, &y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Root mean square of the values, `0.0` when empty
pub fn rms<I>(values: I) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0f32, 0usize), |(sum, count), v| (sum + v * v, count + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f32).sqrt()
    }
}

/// Combines appearance similarity and spatial distance into a match score
pub trait Scoring {
    fn score(&self, similarity: f32, distance: f32) -> f32;
}

impl<F> Scoring for F
where
    F: Fn(f32, f32) -> f32,
{
    fn score(&self, similarity: f32, distance: f32) -> f32 {
        self(similarity, distance)
    }
}

/// Similarity divided by how far a candidate lies beyond `threshold`,
/// scaled by `factor`. Candidates within the threshold keep their similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistancePenalty {
    pub threshold: f32,
    pub factor: f32,
}

impl DistancePenalty {
    pub fn new(threshold: f32, factor: f32) -> Self {
        Self { threshold, factor }
    }
}

impl Scoring for DistancePenalty {
    fn score(&self, similarity: f32, distance: f32) -> f32 {
        let overshoot = distance - self.threshold;
        if overshoot > 0.0 {
            // Never reward a candidate for being just past the threshold
            similarity / (overshoot * self.factor).max(1.0)
        } else {
            similarity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0, 0.0, 0.0];
        assert_abs_diff_eq!(cosine_similarity(&a, &a), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cosine_similarity(&a, &[0.0, 2.0, 0.0]), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cosine_similarity(&a, &[-3.0, 0.0, 0.0]), -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]),
            1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(std::iter::empty()), 0.0);
        assert_abs_diff_eq!(rms([0.9, 0.8, 0.95]), 0.8853, epsilon = 1e-3);
        // sign is lost
        assert_abs_diff_eq!(rms([-1.0, -1.0]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distance_penalty() {
        let penalty = DistancePenalty::new(200.0, 2.0);
        assert_abs_diff_eq!(penalty.score(0.9, 150.0), 0.9);
        assert_abs_diff_eq!(penalty.score(0.9, 200.0), 0.9);
        // 300 px past the threshold with factor 2
        assert_abs_diff_eq!(penalty.score(0.9, 500.0), 0.9 / 600.0, epsilon = 1e-7);
        // just past the threshold never increases the score
        assert_abs_diff_eq!(penalty.score(0.9, 200.1), 0.9);
    }

    #[test]
    fn test_closure_scoring() {
        let similarity_only = |s: f32, _d: f32| s;
        assert_eq!(similarity_only.score(0.5, 1e6), 0.5);
    }
}
