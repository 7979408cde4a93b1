//! Diagnostics sink: structured findings plus an append-only JSONL log.

pub mod diagnostics;
pub mod jsonl;
