//! # Chat Harness
//!
//! Message-intent routing and retrieval orchestration for a document chat.
//!
//! Every user message is classified into an [`intent::Intent`] and then
//! dispatched: reserved commands trigger backend jobs, search requests
//! embed the query and ask the retrieval backend for chunks, follow-ups
//! are answered from the previous results only, file requests are fuzzy
//! matched against the user's files, and everything else goes to a
//! streaming language model with a token-budgeted history.
//!
//! ## Architecture
//!
//! ```text
//!   user message
//!        │
//!        ▼
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐
//! │  Classifier  │──▶│ Dispatcher │──▶│ Retrieval / LLM  │
//! │ rules | LLM  │   │ (session)  │   │ Backend commands │
//! └──────────────┘   └─────┬──────┘   └──────────────────┘
//!                          │
//!                          ▼
//!                    ┌──────────┐
//!                    │  SQLite  │
//!                    │  store   │
//!                    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chat init                          # create database
//! chat classify "find the Q3 budget" # → semantic_search
//! chat send "summarise the onboarding guide"
//! chat repl                          # interactive session
//! chat serve                         # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Chats, messages, chunks, files |
//! | [`error`] | Typed turn failures |
//! | [`intent`] | Intent classification |
//! | [`filters`] | Inline filter extraction from queries |
//! | [`embedding`] | Query embedding providers |
//! | [`retrieval`] | Retrieval backend gateway |
//! | [`backend`] | Ingestion and score-test commands |
//! | [`llm`] | Streaming chat-completion client |
//! | [`prompt`] | Prompt assembly and history trimming |
//! | [`files`] | Fuzzy file matching |
//! | [`state`] | Conversation state and abort signalling |
//! | [`orchestrator`] | Turn state machine |
//! | [`notify`] | User-visible notifications |
//! | [`store`] | Chat persistence |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backend;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod files;
pub mod filters;
pub mod intent;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod state;
pub mod store;
