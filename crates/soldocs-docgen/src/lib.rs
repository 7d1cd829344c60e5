pub mod generator;
pub mod prompts;

pub use generator::{DocGenerator, BATCH_SIZE, NO_ACCOUNTS_PLACEHOLDER};
