//! Text embeddings for catalog search (§4.3: cosine similarity over embeddings
//! of `displayName [+ category]`).
//!
//! No on-device ML model ships with this crate (no ONNX/Candle runtime is in
//! scope here); `SimpleEmbedder` produces a deterministic hash-bag embedding
//! good enough for cosine-similarity ranking over a product catalog, the same
//! role the teacher's `SimpleEmbedder` filled as its no-model fallback.

use crate::CatalogError;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub embedding_dim: usize,
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            normalize: true,
        }
    }
}

pub struct SimpleEmbedder {
    config: EmbeddingConfig,
}

impl SimpleEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError> {
        let lower = text.to_lowercase();
        let mut embedding = vec![0.0f32; self.config.embedding_dim];

        for (i, c) in lower.chars().enumerate() {
            let idx = (c as usize + i) % self.config.embedding_dim;
            embedding[idx] += 1.0;
        }

        if self.config.normalize {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut embedding {
                    *v /= norm;
                }
            }
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_unit_normalized() {
        let embedder = SimpleEmbedder::new(EmbeddingConfig::default());
        let embedding = embedder.embed("rolled steel plate").unwrap();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn identical_text_embeds_identically() {
        let embedder = SimpleEmbedder::new(EmbeddingConfig::default());
        assert_eq!(
            embedder.embed("steel rod").unwrap(),
            embedder.embed("steel rod").unwrap()
        );
    }
}
