pub mod agent;
pub mod seed;
pub mod webhook;

pub use agent::{validate_startup, Agent, AgentConfig, MAX_ATTEMPTS};
pub use seed::{seed_known_programs, SeedProgram, SEED_PROGRAMS};
