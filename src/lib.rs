// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # factdesk
//!
//! A fact-check desk for suspicious viral messages. An orchestrator walks each
//! case through triage, research, verification and multi-perspective review,
//! and produces a Cofacts-style reply whose narrative text and references are
//! kept strictly apart.
//!
//! ## Architecture
//!
//! - **Case state** (`case`): claim atoms, evidence ledger, review history, audit trail
//! - **Draft** (`draft`): the reply artifact and its format contract
//! - **Knowledge store** (`knowledge`): Cofacts GraphQL adapter and an in-memory store
//! - **Tools** (`tools`): research and verification collaborators with deadlines
//! - **Review** (`review`): viewpoint profiles and the reviewer panel
//! - **Orchestrator** (`orchestrator`): the explicit state machine tying it together
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use factdesk::config::DeskConfig;
//! use factdesk::orchestrator::{CaseInput, Orchestrator, Outcome};
//!
//! # fn collaborators() -> factdesk::orchestrator::Collaborators { unimplemented!() }
//! let config = DeskConfig::default();
//! let desk = Orchestrator::new((&config).into(), collaborators());
//! match desk.process(CaseInput::reference("2zn1LjQn7Ozm7")).unwrap() {
//!     Outcome::Final(done) => println!("{}", done.draft.text()),
//!     Outcome::AwaitingInput(waiting) => println!("{}", waiting.prompt),
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod case;
pub mod config;
pub mod draft;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod paths;
pub mod review;
pub mod submit;
pub mod tools;
