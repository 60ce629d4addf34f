//! # studydeck
//!
//! Document ingestion backend for a study assistant. Uploaded PDFs or pasted
//! notes are turned into titled, size-bounded sections that downstream
//! features (flashcards, quizzes, chat) work from. Calls to the generative
//! AI service go through a classifier and a backoff retrier.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────┐
//! │ Blob storage │──▶│ Acquisition │──▶│ Segmenter │──▶│  SQLite  │
//! │  FS / S3     │   │ PDF / text  │   │ split+fix │   │ versions │
//! └──────────────┘   └─────────────┘   └───────────┘   └────┬─────┘
//!                                                           │
//!                         ┌─────────────────────────────────┤
//!                         ▼                                 ▼
//!                ┌─────────────────┐                 ┌────────────┐
//!                │ Generation      │                 │  Notifier  │
//!                │ retry+classify  │                 │ (webhook)  │
//!                └─────────────────┘                 └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! deck init                              # create database
//! deck ingest ./notes/biology.pdf        # acquire, segment, persist
//! deck segment ./notes/biology.pdf       # dry run, print sections
//! deck show <document-id>
//! deck chat <document-id> "What does the mitochondria do?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Jobs, documents, versions, sections |
//! | [`error`] | Failure classification and localized messages |
//! | [`retry`] | Exponential backoff retrier |
//! | [`completion`] | Completion client and its resilient wrapper |
//! | [`storage`] | Blob storage (filesystem, S3) |
//! | [`extract`] | Text acquisition and checksums |
//! | [`segment`] | Heading-driven section segmenter |
//! | [`store`] | Document store (SQLite, in-memory) |
//! | [`generate`] | Per-section flashcard generation |
//! | [`notify`] | Ready notifications |
//! | [`progress`] | Progress reporting |
//! | [`ingest`] | Pipeline orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod ingest_cmd;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod progress;
pub mod retry;
pub mod segment;
pub mod show;
pub mod storage;
pub mod store;
