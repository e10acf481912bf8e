//! Backend implementations selectable through profiles.
//!
//! `mock` backends are deterministic and answer from recorded data or the
//! built-in fixtures; the others talk to real infrastructure.

pub mod db;
pub mod embedding;
pub mod fixtures;
pub mod llm;
pub mod vector;
