//! Workspace harvester for snapshotter.
//!
//! Reads the tokens collected by the OAuth service, walks members, channels
//! and message history through the paginated Slack API, redacts every record
//! with [`redact::sanitize`] and writes the snapshot tree as it goes.
//!
//! # Components
//!
//! - [`redact`]: pure redaction rules
//! - [`snapshot`]: on-disk snapshot layout
//! - [`harvester`]: orchestration of the above over a token set

pub mod error;
pub mod harvester;
pub mod redact;
pub mod snapshot;

pub use error::{HarvestError, Result};
pub use harvester::{CONVERSATION_TYPES, HarvestConfig, HarvestReport, Harvester};
pub use redact::{PLACEHOLDER, mask_text, sanitize};
pub use snapshot::SnapshotWriter;
