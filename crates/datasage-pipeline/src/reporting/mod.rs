//! Report outputs derived from a finished run.
//!
//! - [`compress_for_agents`] shrinks a [`crate::types::DatasetProfile`] for
//!   LLM consumption.
//! - [`describe_change`] and [`processing_narrative`] turn audit log entries
//!   into sentences for the human summary.
//!
//! # Example
//!
//! ```rust,ignore
//! use datasage_pipeline::reporting::{compress_for_agents, processing_narrative};
//!
//! let compressed = compress_for_agents(&processed.profile);
//! println!("{}", serde_json::to_string_pretty(&compressed)?);
//!
//! for line in processing_narrative(&processed.logs) {
//!     println!("- {line}");
//! }
//! ```

mod compressor;
mod narrative;

pub use compressor::{CompressedColumn, CompressedProfile, compress_for_agents};
pub use narrative::{describe_change, processing_narrative};
