//! Near-duplicate concept removal by summary similarity.

use crate::embeddings::{cosine_similarity, Embedder};
use anyhow::{anyhow, Result};
use qpattern_ingest::Concept;
use serde::{Deserialize, Serialize};

/// Summaries more similar than this are treated as the same concept.
pub const DEDUP_SIMILARITY_THRESHOLD: f32 = 0.95;

/// A concept dropped in favour of a near-duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRemoval {
    pub removed: String,
    pub kept: String,
    pub removed_summary: String,
    pub kept_summary: String,
}

/// Greedy clustering in input order: each unclustered concept opens a cluster
/// and absorbs every later unclustered concept with similarity `> threshold`.
/// One survivor per cluster, chosen by `Concept::preference_key` (first wins
/// on ties).
pub fn dedup_semantic(
    concepts: Vec<Concept>,
    embedder: &dyn Embedder,
    threshold: f32,
) -> Result<(Vec<Concept>, Vec<SemanticRemoval>)> {
    if concepts.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let summaries: Vec<String> = concepts.iter().map(|c| c.summary.clone()).collect();
    let vectors = embedder.embed(&summaries)?;
    if vectors.len() != concepts.len() {
        return Err(anyhow!(
            "embedder {} returned {} vectors for {} summaries",
            embedder.name(),
            vectors.len(),
            concepts.len()
        ));
    }

    let mut processed = vec![false; concepts.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..concepts.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let mut cluster = vec![i];
        for j in (i + 1)..concepts.len() {
            if !processed[j] && cosine_similarity(&vectors[i], &vectors[j]) > threshold {
                processed[j] = true;
                cluster.push(j);
            }
        }
        clusters.push(cluster);
    }

    let mut kept = Vec::with_capacity(clusters.len());
    let mut removed = Vec::new();
    for cluster in clusters {
        let best = cluster[1..].iter().fold(cluster[0], |best, &idx| {
            if concepts[idx].preference_key() > concepts[best].preference_key() {
                idx
            } else {
                best
            }
        });
        for &idx in cluster.iter().filter(|&&idx| idx != best) {
            removed.push(SemanticRemoval {
                removed: concepts[idx].name.clone(),
                kept: concepts[best].name.clone(),
                removed_summary: concepts[idx].summary.clone(),
                kept_summary: concepts[best].summary.clone(),
            });
        }
        kept.push(best);
    }

    let mut slots: Vec<Option<Concept>> = concepts.into_iter().map(Some).collect();
    let survivors = kept.into_iter().filter_map(|idx| slots[idx].take()).collect();
    Ok((survivors, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TokenHashEmbedder;
    use qpattern_ingest::ConceptKind;

    fn concept(name: &str, summary: &str, kind: ConceptKind, docstring: &str) -> Concept {
        Concept {
            name: name.to_string(),
            summary: summary.to_string(),
            docstring: docstring.to_string(),
            source_code: String::new(),
            kind: Some(kind),
            is_target_subclass: Some(false),
            base_classes: None,
        }
    }

    #[test]
    fn identical_summaries_collapse_to_preferred_concept() {
        let concepts = vec![
            concept("/qiskit/a.qft_fn", "Quantum Fourier transform.", ConceptKind::Function, "long doc"),
            concept("/qiskit/b.QFT", "Quantum Fourier transform.", ConceptKind::Class, "doc"),
            concept("/qiskit/c.Grover", "Amplitude amplification operator.", ConceptKind::Class, "doc"),
        ];
        let (kept, removed) =
            dedup_semantic(concepts, &TokenHashEmbedder::default(), DEDUP_SIMILARITY_THRESHOLD).unwrap();
        let names: Vec<&str> = kept.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["/qiskit/b.QFT", "/qiskit/c.Grover"]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].removed, "/qiskit/a.qft_fn");
        assert_eq!(removed[0].kept, "/qiskit/b.QFT");
    }

    #[test]
    fn ties_keep_the_first_concept() {
        let concepts = vec![
            concept("/qiskit/a.X", "Same summary.", ConceptKind::Class, "doc"),
            concept("/qiskit/b.X", "Same summary.", ConceptKind::Class, "doc"),
        ];
        let (kept, _) =
            dedup_semantic(concepts, &TokenHashEmbedder::default(), DEDUP_SIMILARITY_THRESHOLD).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "/qiskit/a.X");
    }
}
