//! `CatalogIndex` implementation (C4, §4.3): semantic search over product
//! embeddings with a substring-containment fallback when nothing clears the
//! similarity threshold.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use voice_agent_core::{CatalogIndex, CatalogMatch, ProductRecord};
use voice_agent_core::Result as CoreResult;

use crate::embeddings::SimpleEmbedder;
use crate::vector_store::{Document, VectorStore};
use crate::CatalogError;

/// Score assigned to a fuzzy-fallback hit (§4.3).
pub const FUZZY_FALLBACK_SCORE: f32 = 0.7;

/// Semantic-first, fuzzy-fallback catalog over a fixed product set.
///
/// Products are kept in an in-memory map alongside the vector store so the
/// substring fallback (§4.3's "consulted only when semantic search returns
/// empty") doesn't need a second round trip to Qdrant.
pub struct SemanticCatalogIndex {
    store: VectorStore,
    embedder: SimpleEmbedder,
    products: RwLock<HashMap<String, ProductRecord>>,
}

impl SemanticCatalogIndex {
    pub fn new(store: VectorStore, embedder: SimpleEmbedder) -> Self {
        Self {
            store,
            embedder,
            products: RwLock::new(HashMap::new()),
        }
    }

    /// Embed and upsert a product catalog, replacing any prior load.
    pub async fn load_products(&self, products: Vec<ProductRecord>) -> Result<(), CatalogError> {
        let documents: Vec<Document> = products
            .iter()
            .map(|p| Document {
                id: p.key.clone(),
                content: embeddable_text(p),
                title: Some(p.display_name.clone()),
                category: Some(p.category.clone()),
                metadata: HashMap::new(),
            })
            .collect();

        let embeddings: Result<Vec<_>, _> = documents
            .iter()
            .map(|d| self.embedder.embed(&d.content))
            .collect();
        let embeddings = embeddings?;

        self.store.ensure_collection().await?;
        self.store.upsert(&documents, &embeddings).await?;

        let mut map = self.products.write();
        map.clear();
        for p in products {
            map.insert(p.key.clone(), p);
        }
        Ok(())
    }

    fn fuzzy_fallback(&self, query: &str, k: usize) -> Vec<CatalogMatch> {
        let needle = query.to_lowercase();
        let products = self.products.read();
        let mut hits: Vec<_> = products
            .values()
            .filter(|p| {
                let haystack = p.display_name.to_lowercase();
                haystack.contains(&needle) || needle.contains(&haystack)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        hits.truncate(k);
        hits.into_iter()
            .map(|product| CatalogMatch {
                product,
                score: FUZZY_FALLBACK_SCORE,
            })
            .collect()
    }
}

fn embeddable_text(product: &ProductRecord) -> String {
    format!("{} {}", product.display_name, product.category)
}

#[async_trait]
impl CatalogIndex for SemanticCatalogIndex {
    async fn search(&self, query: &str, k: usize, min_score: f32) -> CoreResult<Vec<CatalogMatch>> {
        let embedding = self
            .embedder
            .embed(query)
            .map_err(|e| voice_agent_core::Error::Internal(e.to_string()))?;

        let raw = self
            .store
            .search(&embedding, k.max(20), None)
            .await
            .map_err(|e| voice_agent_core::Error::UpstreamUnavailable(e.to_string()))?;

        let products = self.products.read();
        let mut matches: Vec<CatalogMatch> = raw
            .into_iter()
            .filter(|r| r.score >= min_score)
            .filter_map(|r| {
                products.get(&r.id).map(|product| CatalogMatch {
                    product: product.clone(),
                    score: r.score,
                })
            })
            .collect();
        drop(products);

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product.key.cmp(&b.product.key))
        });
        matches.truncate(k);

        if matches.is_empty() {
            return Ok(self.fuzzy_fallback(query, k));
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::VectorStoreConfig;

    fn product(key: &str, name: &str) -> ProductRecord {
        ProductRecord {
            key: key.to_string(),
            display_name: name.to_string(),
            category: "general".to_string(),
            unit_price: 10.0,
            metadata: serde_json::json!({}),
        }
    }

    async fn test_index() -> SemanticCatalogIndex {
        let store = VectorStore::new(VectorStoreConfig::default())
            .await
            .expect("qdrant client construction does not require a live connection");
        SemanticCatalogIndex::new(
            store,
            SimpleEmbedder::new(crate::embeddings::EmbeddingConfig::default()),
        )
    }

    #[tokio::test]
    async fn fuzzy_fallback_matches_substring_case_insensitively() {
        let index = test_index().await;
        *index.products.write() = HashMap::from([
            ("p1".to_string(), product("p1", "Rolled Steel Plate")),
            ("p2".to_string(), product("p2", "Copper Wire")),
        ]);

        let hits = index.fuzzy_fallback("steel plate", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product.key, "p1");
        assert_eq!(hits[0].score, FUZZY_FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn fuzzy_fallback_is_empty_with_no_substring_match() {
        let index = test_index().await;
        *index.products.write() = HashMap::from([("p1".to_string(), product("p1", "Copper Wire"))]);

        assert!(index.fuzzy_fallback("titanium rod", 3).is_empty());
    }
}
