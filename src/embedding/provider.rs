//! Provider traits.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Blocking representation provider.
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Identifier of the model producing the vectors. Versions cache keys.
    fn model_id(&self) -> &str;

    /// Embed one text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the result is aligned with `texts`.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Async representation provider, for providers reached over the network.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use halberd::embedding::AsyncEmbeddingProvider;
/// use halberd::error::Result;
///
/// #[derive(Debug)]
/// struct Constant;
///
/// #[async_trait]
/// impl AsyncEmbeddingProvider for Constant {
///     fn model_id(&self) -> &str {
///         "constant"
///     }
///
///     async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
///         Ok(vec![1.0, 0.0])
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncEmbeddingProvider: Send + Sync + Debug {
    /// Identifier of the model producing the vectors. Versions cache keys.
    fn model_id(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the result is aligned with `texts`.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_many(texts)
    }
}

#[async_trait]
impl<P: AsyncEmbeddingProvider + ?Sized> AsyncEmbeddingProvider for Arc<P> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_many(texts).await
    }
}
