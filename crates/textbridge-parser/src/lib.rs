//! Consumer-module layer over the shared segmentation runtime.
//!
//! This crate is what a host plugin links: per-language bridges that
//! resolve and cache their segmentation entry point, token sequences with
//! the measurements the host indexes on, scan sessions matching the host's
//! begin / next / end callback shape, and the status codes it expects back.
//! The lifecycle heavy lifting (one shared runtime instance, per-thread
//! attachment counting, bounded handle frames) lives in
//! [`textbridge_runtime`].

pub mod bridge;
pub mod languages;
pub mod session;
pub mod status;
pub mod token;

pub use bridge::{LanguageBridge, SegmenterSpec};
pub use session::{ScanSession, SessionId, SessionRegistry};
pub use status::ParserStatus;
pub use token::{Token, TokenSequence};
