//! Local lexical policy index.
//!
//! Built fresh for every run from the Markdown files in a policy directory.
//! Documents are split into overlapping character windows and ranked by how
//! many distinct query terms each window contains.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use listguard_core::SearchHit;
use listguard_runtime::{PolicySearch, SearchError};

pub const CHUNK_CHARS: usize = 1000;
pub const CHUNK_OVERLAP: usize = 100;
pub const TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChunk {
    pub content: String,
    pub source: String,
}

#[derive(Debug, Default)]
pub struct LocalPolicyIndex {
    chunks: Vec<PolicyChunk>,
}

impl LocalPolicyIndex {
    /// Index every `*.md` file under `dir`, recursively, in path order.
    ///
    /// A missing directory yields an empty index.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "Policy directory not found, index is empty");
            return Ok(Self::default());
        }

        let mut files = Vec::new();
        collect_markdown(dir, &mut files)?;
        files.sort();

        let mut index = Self::default();
        for path in files {
            let text = std::fs::read_to_string(&path)?;
            let source = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .display()
                .to_string();
            index.add_document(&source, &text);
        }

        tracing::info!(chunks = index.len(), dir = %dir.display(), "Policy index built");
        Ok(index)
    }

    pub fn add_document(&mut self, source: &str, text: &str) {
        self.chunks.extend(chunk_text(text, CHUNK_CHARS, CHUNK_OVERLAP).into_iter().map(
            |content| PolicyChunk {
                content,
                source: source.to_string(),
            },
        ));
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `k` chunks by distinct term overlap. Ties keep index order.
    pub fn query(&self, query: &str, k: usize) -> Vec<&PolicyChunk> {
        let terms = terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, chunk)| {
                let chunk_terms = self::terms(&chunk.content);
                let score = terms.intersection(&chunk_terms).count();
                (score > 0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| &self.chunks[i])
            .collect()
    }
}

#[async_trait]
impl PolicySearch for LocalPolicyIndex {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self
            .query(query, TOP_K)
            .into_iter()
            .map(|chunk| SearchHit::new(chunk.content.clone()).with_source(chunk.source.clone()))
            .collect())
    }

    fn name(&self) -> &str {
        "local-policy-index"
    }
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_markdown(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            out.push(path);
        }
    }
    Ok(())
}

/// Split into windows of `size` chars, each overlapping the previous by `overlap`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_windows_overlap() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, 1000, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(&chunks[0][900..], &chunks[1][..100]);
        assert_eq!(chunks[2].chars().count(), 700);
    }

    #[test]
    fn test_short_and_empty_text() {
        assert_eq!(chunk_text("  short policy  ", 1000, 100), vec!["short policy"]);
        assert!(chunk_text("   ", 1000, 100).is_empty());
    }

    #[test]
    fn test_chunking_respects_char_boundaries() {
        let text = "é".repeat(1500);
        let chunks = chunk_text(&text, 1000, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chars().count(), 600);
    }

    #[test]
    fn test_query_ranks_by_term_overlap() {
        let mut index = LocalPolicyIndex::default();
        index.add_document("a.md", "Cosmetics labeling requirements in the US.");
        index.add_document("b.md", "Dietary supplements prohibited claims US: no disease claims.");
        index.add_document("c.md", "Shipping times for furniture.");

        let hits = index.query("Dietary Supplements prohibited US", 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "b.md");
        assert_eq!(hits[1].source, "a.md");
    }

    #[test]
    fn test_query_limits_to_k() {
        let mut index = LocalPolicyIndex::default();
        for i in 0..8 {
            index.add_document(&format!("{}.md", i), "supplement policy");
        }
        assert_eq!(index.query("supplement", TOP_K).len(), 5);
        assert_eq!(index.query("supplement", TOP_K)[0].source, "0.md");
    }

    #[tokio::test]
    async fn test_search_port_tags_source() {
        let mut index = LocalPolicyIndex::default();
        index.add_document("fda/supplements.md", "Supplements may not claim to cure disease.");
        let hits = index.search("supplements cure").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.as_deref(), Some("fda/supplements.md"));
    }

    #[test]
    fn test_load_directory() {
        let dir = std::env::temp_dir().join(format!("listguard-policies-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("one.md"), "Labeling rules.").unwrap();
        std::fs::write(dir.join("nested/two.md"), "Claim substantiation rules.").unwrap();
        std::fs::write(dir.join("ignored.txt"), "Not a policy.").unwrap();

        let index = LocalPolicyIndex::load(&dir).unwrap();
        assert_eq!(index.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let index = LocalPolicyIndex::load(Path::new("/nonexistent/listguard/policies")).unwrap();
        assert!(index.is_empty());
    }
}
