//! Citable policy evidence.
//!
//! Search hits from every policy query are merged into one [`EvidenceSet`].
//! Passages are deduplicated by exact content across all queries, then given
//! `E<n>` ids in first-seen order. Ids never change once assigned and are the
//! only way a verdict may point at evidence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::product::ProductDescriptor;

pub const DEFAULT_SOURCE: &str = "Policy DB";
pub const DEFAULT_URL: &str = "#";

/// Stable short identifier of an evidence item, rendered `E<n>` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvidenceId(u32);

impl EvidenceId {
    /// Build an id from its 1-based ordinal. Returns `None` for zero.
    pub fn new(ordinal: u32) -> Option<Self> {
        (ordinal > 0).then_some(Self(ordinal))
    }

    pub fn ordinal(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid evidence id '{0}': expected E<n> with n >= 1")]
pub struct InvalidEvidenceId(pub String);

impl FromStr for EvidenceId {
    type Err = InvalidEvidenceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidEvidenceId(s.to_string());
        let digits = s.strip_prefix('E').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let ordinal: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(ordinal).ok_or_else(invalid)
    }
}

impl TryFrom<String> for EvidenceId {
    type Error = InvalidEvidenceId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvidenceId> for String {
    fn from(id: EvidenceId) -> Self {
        id.to_string()
    }
}

/// How closely a passage matched its query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelevanceTier {
    #[default]
    High,
    Medium,
    Low,
}

impl fmt::Display for RelevanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelevanceTier::High => "High",
            RelevanceTier::Medium => "Medium",
            RelevanceTier::Low => "Low",
        };
        f.write_str(label)
    }
}

/// One passage returned by the policy search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

impl SearchHit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
            url: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A deduplicated, citable passage of policy text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub content: String,
    pub source: String,
    pub url: String,
    pub retrieved_on: NaiveDate,
    pub relevance: RelevanceTier,
    /// The first query that returned this passage.
    pub query: String,
}

/// Insertion-ordered evidence with unique content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    items: Vec<EvidenceItem>,
}

impl EvidenceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge query-tagged hits into an evidence set.
    ///
    /// Hits must be supplied in query order. A passage seen again under a later
    /// query is dropped; the first originating query is kept.
    pub fn from_tagged_hits<I, Q>(hits: I, retrieved_on: NaiveDate) -> Self
    where
        I: IntoIterator<Item = (Q, SearchHit)>,
        Q: Into<String>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::new();

        for (query, hit) in hits {
            if !seen.insert(hit.content.clone()) {
                continue;
            }

            let ordinal = items.len() as u32 + 1;
            let Some(id) = EvidenceId::new(ordinal) else {
                continue;
            };

            items.push(EvidenceItem {
                id,
                content: hit.content,
                source: hit.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                url: hit.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
                retrieved_on,
                relevance: RelevanceTier::High,
                query: query.into(),
            });
        }

        Self { items }
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items.iter()
    }

    pub fn get(&self, id: EvidenceId) -> Option<&EvidenceItem> {
        // Ids are dense and 1-based.
        self.items
            .get(id.ordinal() as usize - 1)
            .filter(|item| item.id == id)
    }

    pub fn contains(&self, id: EvidenceId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Score how well the queries covered the policy corpus.
    ///
    /// Queries count only through the items they contributed after
    /// deduplication; a query whose passages were all seen earlier adds nothing.
    pub fn coverage(&self) -> CoverageReport {
        let distinct_queries = self
            .items
            .iter()
            .map(|item| item.query.as_str())
            .collect::<HashSet<_>>()
            .len();
        let items = self.items.len();

        let mut score = 0;
        if distinct_queries >= 3 {
            score += 50;
        }
        if items >= 5 {
            score += 50;
        }

        CoverageReport {
            distinct_queries,
            items,
            score,
            health: DataHealth::from_score(score),
        }
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a EvidenceItem;
    type IntoIter = std::slice::Iter<'a, EvidenceItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Coarse label for evidence coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataHealth {
    Poor,
    Fair,
    Good,
}

impl DataHealth {
    fn from_score(score: u8) -> Self {
        match score {
            s if s < 50 => DataHealth::Poor,
            s if s < 100 => DataHealth::Fair,
            _ => DataHealth::Good,
        }
    }
}

impl fmt::Display for DataHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataHealth::Poor => "POOR",
            DataHealth::Fair => "FAIR",
            DataHealth::Good => "GOOD",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub distinct_queries: usize,
    pub items: usize,
    pub score: u8,
    pub health: DataHealth,
}

/// The three fixed policy queries for a product, in issue order:
/// prohibitions, labeling requirements, claim substantiation.
pub fn policy_queries(product: &ProductDescriptor) -> [String; 3] {
    let category = product.category();
    let jurisdiction = product.jurisdiction();
    [
        format!("{} prohibited {}", category, jurisdiction),
        format!("{} labeling requirements {}", category, jurisdiction),
        format!("{} claim substantiation {}", product.function(), jurisdiction),
    ]
}
