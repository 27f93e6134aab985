use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embeddings::error::EmbeddingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Remote,
    Local,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> EmbeddingProviderKind;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

pub fn finalize_embeddings(
    mut vectors: Vec<Vec<f32>>,
    normalize_l2: bool,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.is_empty() {
        return Ok(vectors);
    }

    let dims = vectors[0].len();
    if dims == 0 {
        return Err(EmbeddingError::InvalidResponse(
            "provider returned an empty embedding vector".to_string(),
        ));
    }

    for (idx, vector) in vectors.iter().enumerate() {
        if vector.len() != dims {
            return Err(EmbeddingError::InvalidResponse(format!(
                "inconsistent embedding dimensions at index {idx}: expected {dims}, got {}",
                vector.len()
            )));
        }

        if vector.iter().any(|value| !value.is_finite()) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding vector at index {idx} contains non-finite values"
            )));
        }
    }

    if normalize_l2 {
        l2_normalize_in_place(&mut vectors);
    }

    Ok(vectors)
}

pub fn l2_normalize_in_place(vectors: &mut [Vec<f32>]) {
    for vector in vectors {
        l2_normalize(vector);
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return;
    }
    for value in vector {
        *value /= norm;
    }
}

/// L2-normalised mean of `vectors`.
///
/// Only vectors of the most common length take part; ties go to the length
/// seen first. Empty vectors are ignored. Returns `None` when nothing is left.
pub fn mean_embedding<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let vectors: Vec<&[f32]> = vectors.into_iter().filter(|v| !v.is_empty()).collect();

    let mut counts: Vec<(usize, usize)> = Vec::new();
    for vector in &vectors {
        match counts.iter_mut().find(|(len, _)| *len == vector.len()) {
            Some((_, count)) => *count += 1,
            None => counts.push((vector.len(), 1)),
        }
    }
    let dims = counts
        .iter()
        .fold(None, |best: Option<(usize, usize)>, &(len, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((len, count)),
        })?
        .0;

    let mut sum = vec![0.0f32; dims];
    let mut used = 0usize;
    for vector in &vectors {
        if vector.len() != dims {
            tracing::warn!(
                expected = dims,
                got = vector.len(),
                "skipping embedding with mismatched dimensions"
            );
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
        used += 1;
    }

    for value in &mut sum {
        *value /= used as f32;
    }
    l2_normalize(&mut sum);
    Some(sum)
}
