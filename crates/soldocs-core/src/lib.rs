pub mod config;
pub mod error;
pub mod idl;
pub mod types;
pub mod validation;

pub use config::Config;
pub use error::{Result, SolDocsError};
pub use types::{
    AgentError, AgentState, Documentation, IdlCacheEntry, ProgramMetadata, ProgramStatus,
    QueueItem, QueueStatus, StoreStats,
};
pub use validation::{is_valid_program_id, validate_program_id};
