//! # Coach RAG Core
//!
//! Runtime-agnostic logic for the Coach RAG ingestion pipeline: the content
//! data model, content hashing, the sliding-window chunker, YouTube URL
//! canonicalization, duplicate detection, coach access fan-out, and the
//! traits through which the pipeline reaches its collaborators (datastore,
//! embedding service, video/transcript service).
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! The `coach-rag` application crate supplies the concrete implementations.

pub mod access;
pub mod chunk;
pub mod dedup;
pub mod embedding;
pub mod hash;
pub mod models;
pub mod store;
pub mod video;
pub mod youtube_url;
