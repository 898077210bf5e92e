//! Search index seam and the default keyword implementation.

use std::cmp::Ordering;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{error::Result, types::Skill};

/// Fields of a skill submitted to an [`Indexer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub id: String,
    pub name: String,
    pub description: String,
    pub body: String,
    pub license: Option<String>,
    pub compatibility: Option<String>,
}

impl From<&Skill> for IndexDocument {
    fn from(skill: &Skill) -> Self {
        Self {
            id: skill.id.clone(),
            name: skill.metadata.name.clone(),
            description: skill.metadata.description.clone(),
            body: skill.body.clone(),
            license: skill.metadata.license.clone(),
            compatibility: skill.metadata.compatibility.clone(),
        }
    }
}

/// Full-text search over skills.
///
/// The catalog only ever replaces the whole corpus and asks for ranked ids.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Drop all prior contents and index `documents`.
    async fn replace_all(&self, documents: Vec<IndexDocument>) -> Result<()>;

    /// Up to `limit` identifiers, best match first.
    async fn query(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

const NAME_WEIGHT: u32 = 8;
const DESCRIPTION_WEIGHT: u32 = 4;
const BODY_WEIGHT: u32 = 1;
const EXTRA_WEIGHT: u32 = 2;

struct Entry {
    id: String,
    name: String,
    fields: Vec<(u32, Vec<String>)>,
}

impl From<IndexDocument> for Entry {
    fn from(doc: IndexDocument) -> Self {
        let mut fields = vec![
            (NAME_WEIGHT, tokenize(&doc.name)),
            (DESCRIPTION_WEIGHT, tokenize(&doc.description)),
            (BODY_WEIGHT, tokenize(&doc.body)),
        ];
        for extra in [doc.license, doc.compatibility].into_iter().flatten() {
            fields.push((EXTRA_WEIGHT, tokenize(&extra)));
        }
        Self {
            id: doc.id,
            name: doc.name.to_lowercase(),
            fields,
        }
    }
}

impl Entry {
    fn score(&self, query: &str, terms: &[String]) -> u32 {
        let mut score = 0;
        if self.name == query {
            score += NAME_WEIGHT * 4;
        }
        for term in terms {
            for (weight, tokens) in &self.fields {
                for token in tokens {
                    if token == term {
                        score += weight * 2;
                    } else if token.starts_with(term.as_str()) {
                        score += weight;
                    }
                }
            }
        }
        score
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// In-process keyword index: weighted term matches over name, description,
/// body, license and compatibility.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Indexer for MemoryIndex {
    async fn replace_all(&self, documents: Vec<IndexDocument>) -> Result<()> {
        let entries: Vec<Entry> = documents.into_iter().map(Entry::from).collect();
        *self.entries.write().await = entries;
        Ok(())
    }

    async fn query(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let normalized = query.trim().to_lowercase();
        let terms = tokenize(&normalized);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(u32, &str)> = entries
            .iter()
            .map(|e| (e.score(&normalized, &terms), e.id.as_str()))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| match b.0.cmp(&a.0) {
            Ordering::Equal => a.1.cmp(b.1),
            other => other,
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, id)| id.to_string())
            .collect())
    }
}
