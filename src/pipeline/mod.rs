//! Pipeline stages for page snapshots.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the orchestrator in [`crate::snapshot`] only
//! wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! markup ──▶ locate ──▶ fetch ──▶ relocate ──▶ rewrite ──▶ markdown ──▶ describe
//! (parse)    (URLs)    (staging)   (final dir)  (links)    (convert)   (captions)
//! ```
//!
//! 1. [`markup`]   parse HTML into a tree; the only module that knows html5ever
//! 2. [`locate`]   collect absolute asset URLs from resource attributes
//! 3. [`fetch`]    download into a staging directory with type and size limits;
//!    the only stage with network I/O apart from captioning
//! 4. [`relocate`] copy staged files to their final directory and re-key the map
//! 5. [`rewrite`]  point resource attributes at the relocated files
//! 6. [`markdown`] HTML → Markdown, cleaned by [`postprocess`]
//! 7. [`describe`] caption images through a vision model, using [`encode`]
//!
//! [`naming`] holds the file-naming and path helpers shared by the stages.

pub mod describe;
pub mod encode;
pub mod fetch;
pub mod locate;
pub mod markdown;
pub mod markup;
pub mod naming;
pub mod postprocess;
pub mod relocate;
pub mod rewrite;
