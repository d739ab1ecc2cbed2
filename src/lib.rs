//! # Project Context
//!
//! Builds a bounded textual context from a project directory and sends it to
//! a language model, shrinking the context when the model rejects a request
//! as too large.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐
//! │   walk   │──▶│ context  │──▶│ escalation│──▶│    llm     │
//! │ (events) │   │ (fold)   │   │   (FSM)   │   │ (complete) │
//! └──────────┘   └────┬─────┘   └─────┬─────┘   └────────────┘
//!                     │               │
//!                ┌────▼─────┐   ┌─────▼─────┐
//!                │ extract  │   │ selector  │
//!                │ (format) │   │ (parse)   │
//!                └──────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pctx structure .                 # folder structure only
//! pctx context .                   # structure, contents, statistics
//! pctx ask . "where is the parser?"
//! pctx chat .                      # multi-turn session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and CLI overrides |
//! | [`policy`] | Exclusion set, extension allowlist, extraction policy |
//! | [`models`] | Statistics, reports, target sets, chat messages |
//! | [`walk`] | Sorted traversal as a stream of events |
//! | [`extract`] | Per-format text extraction |
//! | [`context`] | Full and targeted project reports |
//! | [`selector`] | Selector prompt and reply parsing |
//! | [`prompt`] | System prompt, preview, and sandbox templates |
//! | [`llm`] | Completion client and tagged outcomes |
//! | [`escalation`] | Retrieval escalation state machine |
//! | [`report`] | Escalation notices on stderr |
//! | [`sandbox`] | Script execution with a timeout |

pub mod config;
pub mod context;
pub mod escalation;
pub mod extract;
pub mod llm;
pub mod models;
pub mod policy;
pub mod prompt;
pub mod report;
pub mod sandbox;
pub mod selector;
pub mod walk;
