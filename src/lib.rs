//! # Coverage Harness
//!
//! Answers coverage questions against long policy documents with a cited,
//! strictly validated verdict.
//!
//! The pure pipeline (segmentation, multi-query retrieval, prompt assembly,
//! answer normalization) lives in [`coverage_harness_core`]. This crate
//! wires it to concrete collaborators: PDF and text extraction, embedding
//! providers, a SQLite vector store, Ollama or OpenAI-compatible generation,
//! the answer agent, a CLI, and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ pdf / txt  │──▶│  Segment +   │──▶│  SQLite  │
//! │ input_dir  │   │  Embed       │   │ vectors  │
//! └────────────┘   └──────────────┘   └────┬─────┘
//!                                          │
//!                   ┌──────────────────────┤
//!                   ▼                      ▼
//!              ┌──────────┐          ┌──────────┐
//!              │   CLI    │          │   HTTP   │
//!              │  (cov)   │          │  /ask    │
//!              └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cov init                          # create database
//! cov ingest                        # parse, chunk and embed ./pdfs
//! cov search "maternity waiting period"
//! cov ask "Is ambulance cover included?" --file policy.pdf
//! cov serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`extract`] | Page-by-page PDF and text extraction |
//! | [`ingest`] | Parse, export, embed, and store documents |
//! | [`embedding`] | Embedding providers (local, OpenAI, Ollama) |
//! | [`generation`] | Generation clients (Ollama, OpenAI-compatible) |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`agent`] | Question to verdict orchestration |
//! | [`services`] | Service handles built from config |
//! | [`search`] | Retrieval-only command |
//! | [`stats`] | Index statistics |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod stats;
