//! # Coach RAG
//!
//! Ingestion pipeline for per-coach retrieval knowledge bases.
//!
//! Uploaded documents and YouTube transcripts are deduplicated, split into
//! overlapping windows, embedded concurrently, persisted with a version
//! number, and granted to one or more coaches at an access tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────────┐   ┌──────────┐
//! │ File upload │──▶│ Dedup check  │──▶│ Chunk + Embed     │──▶│  SQLite  │
//! │ YouTube     │   │ hash / URL   │   │ (bounded fan-out) │   │ + grants │
//! └─────────────┘   └──────────────┘   └───────────────────┘   └────┬─────┘
//!                                                                   │
//!                                            ┌──────────────────────┤
//!                                            ▼                      ▼
//!                                       ┌──────────┐          ┌──────────┐
//!                                       │   CLI    │          │   HTTP   │
//!                                       │ (ragctl) │          │  (axum)  │
//!                                       └──────────┘          └──────────┘
//! ```
//!
//! The pure pipeline pieces (hashing, chunking, dedup, access fan-out, the
//! [`Store`](coach_rag_core::store::Store) trait) live in `coach-rag-core`;
//! this crate wires them to SQLite, HTTP embedding providers and YouTube.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the store |
//! | [`embedding`] | OpenAI / Ollama embedding providers |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`youtube`] | YouTube Data API and transcript client |
//! | [`error`] | Ingestion error taxonomy |
//! | [`ingest`] | Orchestrator and the file upload flow |
//! | [`youtube_ingest`] | Video and playlist flow |
//! | [`get`] | Source inspection and deactivation |
//! | [`stats`] | Database statistics |
//! | [`scan`] | Local file discovery for the CLI |
//! | [`progress`] | CLI progress reporting |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod scan;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod youtube;
pub mod youtube_ingest;
