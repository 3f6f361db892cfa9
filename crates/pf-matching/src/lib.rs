//! Semantic matching and clustering for guess rounds.
//!
//! ## Core Types
//!
//! - [`EmbeddingProvider`] — the single root for external embedding calls
//! - [`Embeddings`] — two-tier cache (process map, then persistent store)
//!   in front of the provider
//! - [`cosine`] / [`batch_cosine`] — similarity clamped to `[0, 1]`
//! - [`assign_cluster`] — join-or-create with running-mean centroids
//! - [`plan_pruning`] — usefulness-ranked corpus cap that never empties a
//!   cluster
mod cluster;
mod cosine;
mod embed;

pub use cluster::*;
pub use cosine::*;
pub use embed::*;
