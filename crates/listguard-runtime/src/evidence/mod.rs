//! Policy evidence retrieval.
//!
//! The search backend is a port: the calling surface builds a fresh
//! [`PolicySearch`] for every run and hands it to the aggregator, which holds
//! no backend state of its own.

mod aggregator;

pub use aggregator::{EvidenceAggregator, GatheredEvidence, PolicySearch, SearchError};
