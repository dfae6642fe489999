//! # NoteFabric Core
//!
//! Shared vocabulary for every NoteFabric crate: the note/step data model,
//! the error taxonomy, configuration, the client wire protocol and the
//! traits through which the engine reaches its collaborators.
//!
//! ## Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `FabricConfig` loaded from `~/.notefabric/config.toml` |
//! | [`error`] | `FabricError` + `ErrorKind` used by the failure policy |
//! | [`types`] | `Note`, `Step`, `MemoryEntry`, `Edge`, `ToolDefinition` |
//! | [`protocol`] | Inbound/outbound client messages |
//! | [`traits`] | `Tool`, `NoteStorage`, `TextGenerator` |

pub mod config;
pub mod error;
pub mod protocol;
pub mod traits;
pub mod types;

pub use config::FabricConfig;
pub use error::{ErrorKind, FabricError, Result};
pub use types::{
    Edge, MemoryEntry, MemoryEntryType, Note, NoteStatus, Step, StepStatus, ToolDefinition,
};
