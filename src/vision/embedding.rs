use rand::Rng;

use super::{EmbedError, EMBEDDING_DIM};

/// Added to the norm before dividing so a zero vector stays finite
const NORM_EPSILON: f64 = 1e-8;

/// A 512-d image embedding, L2-normalized on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize raw backbone features into an embedding.
    pub fn from_features(features: Vec<f32>) -> Result<Self, EmbedError> {
        if features.len() != EMBEDDING_DIM {
            return Err(EmbedError::Dimension {
                expected: EMBEDDING_DIM,
                got: features.len(),
            });
        }

        Ok(Self(l2_normalize(features)))
    }

    /// Random unit vector used as the degraded stand-in for an unreachable image.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let raw: Vec<f32> = (0..EMBEDDING_DIM)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();
        Self(l2_normalize(raw))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dot(&self, other: &Embedding) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.0) as f32
    }
}

// accumulate in f64 so the unit-norm guarantee holds to ~1e-7
fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt()
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let denom = l2_norm(&v) + NORM_EPSILON;
    for x in v.iter_mut() {
        *x = (*x as f64 / denom) as f32;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_features_is_unit_norm() {
        let features: Vec<f32> = (0..EMBEDDING_DIM).map(|i| (i as f32 * 0.37).sin() * 40.0).collect();
        let emb = Embedding::from_features(features).unwrap();
        assert!((emb.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_features_stay_finite() {
        let emb = Embedding::from_features(vec![0.0; EMBEDDING_DIM]).unwrap();
        assert!(emb.as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(emb.norm(), 0.0);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let result = Embedding::from_features(vec![1.0; 384]);
        assert!(matches!(
            result,
            Err(EmbedError::Dimension {
                expected: 512,
                got: 384
            })
        ));
    }

    #[test]
    fn test_random_is_unit_norm_and_varies() {
        let mut rng = rand::rng();
        let a = Embedding::random(&mut rng);
        let b = Embedding::random(&mut rng);

        assert_eq!(a.as_slice().len(), EMBEDDING_DIM);
        assert!((a.norm() - 1.0).abs() < 1e-6);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dot_of_self_is_one() {
        let features: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32).collect();
        let emb = Embedding::from_features(features).unwrap();
        assert!((emb.dot(&emb) - 1.0).abs() < 1e-5);
    }
}
