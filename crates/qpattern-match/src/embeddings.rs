//! Text embeddings for similarity matching.
//!
//! Two backends:
//! - `TokenHashEmbedder`: deterministic, offline. Words and character
//!   trigrams are hashed into a fixed number of signed buckets.
//! - `OllamaEmbedder`: model embeddings from a local Ollama server.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces one vector per input text.
pub trait Embedder {
    fn name(&self) -> String;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Which backend the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    TokenHash,
    Ollama,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "token_hash" | "tokenhash" => Ok(Self::TokenHash),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown embedding backend: {other}")),
        }
    }
}

impl EmbeddingBackend {
    /// Model used when the configuration names none.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::TokenHash => "token-hash",
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

// ============================================================================
// Token-hash embeddings
// ============================================================================

pub const TOKEN_HASH_DIM: usize = 512;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 14695981039346656037;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

/// Lowercased words of `text`, splitting identifiers on `_`, digits-to-letters
/// and camel-case boundaries (`QFTGate` → `qft`, `gate`).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in text.split(|c: char| !c.is_alphanumeric()) {
        if chunk.is_empty() {
            continue;
        }
        let chars: Vec<char> = chunk.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let (prev, cur) = (chars[i - 1], chars[i]);
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            let boundary = (prev.is_lowercase() && cur.is_uppercase())
                || (prev.is_uppercase() && cur.is_uppercase() && next_lower)
                || (prev.is_alphabetic() != cur.is_alphabetic());
            if boundary {
                words.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        words.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
    words
}

fn add_feature(v: &mut [f32], feature: &str, weight: f32) {
    let h = fnv1a64(feature);
    let idx = (h % (v.len() as u64)) as usize;
    let sign = if ((h >> 32) & 1) == 0 { 1.0 } else { -1.0 };
    v[idx] += sign * weight;
}

fn l2_normalize(v: &mut [f32]) {
    let norm2: f32 = v.iter().map(|x| x * x).sum();
    if norm2 > 0.0 {
        let inv = 1.0 / norm2.sqrt();
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenHashEmbedder {
    pub dim: usize,
}

impl Default for TokenHashEmbedder {
    fn default() -> Self {
        Self { dim: TOKEN_HASH_DIM }
    }
}

impl TokenHashEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim.max(1)];
        for word in tokenize(text) {
            add_feature(&mut v, &format!("w:{word}"), WORD_WEIGHT);
            let padded: Vec<char> = format!("^{word}$").chars().collect();
            for tri in padded.windows(3) {
                add_feature(&mut v, &format!("c:{}", tri.iter().collect::<String>()), TRIGRAM_WEIGHT);
            }
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for TokenHashEmbedder {
    fn name(&self) -> String {
        format!("token-hash-{}", self.dim)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============================================================================
// Ollama embeddings
// ============================================================================

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";

pub fn normalize_ollama_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        host = DEFAULT_OLLAMA_HOST.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    pub host: String,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl OllamaEmbedder {
    pub fn new(host: &str, model: &str) -> Self {
        Self {
            host: normalize_ollama_host(host),
            model: model.to_string(),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl Embedder for OllamaEmbedder {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    /// Prefer `/api/embed` (batched); fall back to `/api/embeddings` (per-item)
    /// for older servers.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;

        let host = &self.host;
        let url_embed = format!("{host}/api/embed");
        let body_embed = serde_json::json!({
            "model": self.model,
            "input": texts,
            "truncate": true
        });

        match client.post(&url_embed).json(&body_embed).send() {
            Ok(resp) if resp.status().is_success() => {
                #[derive(Deserialize)]
                struct EmbedResp {
                    embeddings: Vec<Vec<f32>>,
                }

                let out: EmbedResp = resp
                    .json()
                    .map_err(|e| anyhow!("ollama /api/embed returned invalid JSON: {e}"))?;
                if out.embeddings.len() != texts.len() {
                    return Err(anyhow!(
                        "ollama /api/embed returned {} embeddings for {} inputs",
                        out.embeddings.len(),
                        texts.len()
                    ));
                }
                return Ok(out.embeddings);
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "ollama /api/embed unavailable, falling back");
            }
            Err(e) => {
                return Err(anyhow!(
                    "failed to reach ollama at {url_embed} (is it running?) ({e}). Try: `ollama serve` or set OLLAMA_HOST"
                ));
            }
        }

        let url = format!("{host}/api/embeddings");
        #[derive(Deserialize)]
        struct EmbeddingsResp {
            embedding: Vec<f32>,
        }

        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            let body = serde_json::json!({ "model": self.model, "prompt": t });
            let resp = client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| anyhow!("failed to reach ollama at {url} ({e})"))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().unwrap_or_default();
                return Err(anyhow!("ollama http error {status}: {text}"));
            }
            let r: EmbeddingsResp = resp
                .json()
                .map_err(|e| anyhow!("ollama /api/embeddings returned invalid JSON: {e}"))?;
            out.push(r.embedding);
        }
        Ok(out)
    }
}

/// Backend selection as carried by the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model name; unset means the backend's default.
    pub model: Option<String>,
    pub ollama_host: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::TokenHash,
            model: None,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.backend.default_model())
    }

    pub fn build(&self) -> Box<dyn Embedder> {
        match self.backend {
            EmbeddingBackend::TokenHash => Box::new(TokenHashEmbedder::default()),
            EmbeddingBackend::Ollama => Box::new(OllamaEmbedder::new(&self.ollama_host, self.model())),
        }
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Cosine similarity; 0 when either vector is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// `m[i][j] = cos(a[i], b[j])`.
pub fn cosine_similarity_matrix(a: &[Vec<f32>], b: &[Vec<f32>]) -> Vec<Vec<f32>> {
    a.iter()
        .map(|x| b.iter().map(|y| cosine_similarity(x, y)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tokenize_splits_identifiers() {
        assert_eq!(tokenize("QFTGate"), vec!["qft", "gate"]);
        assert_eq!(tokenize("measure_all"), vec!["measure", "all"]);
        assert_eq!(tokenize("amplitudeEncoding2d"), vec!["amplitude", "encoding", "2", "d"]);
        assert!(tokenize("  ;; ").is_empty());
    }

    #[test]
    fn identical_text_scores_one_and_case_is_ignored() {
        let e = TokenHashEmbedder::default();
        let a = e.embed_one("GroverOperator");
        let b = e.embed_one("grover_operator");
        assert_relative_eq!(cosine_similarity(&a, &b), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn unrelated_text_scores_low() {
        let e = TokenHashEmbedder::default();
        let a = e.embed_one("quantum fourier transform");
        let b = e.embed_one("plot histogram");
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn zero_vectors_score_zero() {
        let e = TokenHashEmbedder::default();
        let empty = e.embed_one("");
        let x = e.embed_one("qft");
        assert_eq!(cosine_similarity(&empty, &x), 0.0);
        let m = cosine_similarity_matrix(&[x.clone(), empty], &[x]);
        assert_relative_eq!(m[0][0], 1.0, epsilon = 1e-5);
        assert_eq!(m[1][0], 0.0);
    }

    #[test]
    fn host_is_normalized() {
        assert_eq!(normalize_ollama_host(""), DEFAULT_OLLAMA_HOST);
        assert_eq!(normalize_ollama_host("localhost:11434/"), "http://localhost:11434");
    }

    #[test]
    fn backend_parses_from_cli_spelling() {
        assert_eq!("token-hash".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::TokenHash);
        assert_eq!("ollama".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::Ollama);
    }

    #[test]
    fn ollama_defaults_to_an_ollama_model() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Ollama,
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.model(), DEFAULT_OLLAMA_MODEL);
        assert_eq!(config.build().name(), "ollama:nomic-embed-text");

        let chosen = EmbeddingConfig {
            model: Some("mxbai-embed-large".to_string()),
            ..config
        };
        assert_eq!(chosen.build().name(), "ollama:mxbai-embed-large");

        let parsed: EmbeddingConfig = serde_json::from_str(r#"{"backend": "ollama"}"#).unwrap();
        assert_eq!(parsed.model(), "nomic-embed-text");
    }
}
