//! # Coverage Harness Core
//!
//! Pure logic for Coverage Harness: document segmentation, multi-query
//! retrieval, prompt assembly, and answer normalization, plus the traits
//! through which the application plugs in its collaborators.
//!
//! This crate performs no filesystem, database, or network I/O. Concrete
//! embedding providers, generation clients, and the SQLite store live in
//! the `coverage-harness` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! pages ─▶ sections ─▶ chunk ─▶ Store::upsert
//!                                   │
//! question ─▶ retrieval ◀───────────┘
//!                 │
//!                 ▼
//!              prompt ─▶ GenerationService ─▶ answer (parse, map, backfill)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Pages, section markers, chunks, retrieved hits |
//! | [`tokens`] | Token counting (`cl100k_base`) |
//! | [`sections`] | Section header classification and detection |
//! | [`chunk`] | Sentence segmentation and overlapping chunk assembly |
//! | [`embedding`] | Embedding provider trait and vector helpers |
//! | [`store`] | Vector store trait and in-memory implementation |
//! | [`generation`] | Generation service trait |
//! | [`retrieval`] | Query expansion, per-variant search, max-score merge |
//! | [`prompt`] | Context block and analyst prompts |
//! | [`answer`] | Loose JSON parsing and verdict normalization |

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod sections;
pub mod store;
pub mod tokens;
