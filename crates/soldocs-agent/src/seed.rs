//! One-time seeding of well-known programs. The seed list is compiled in;
//! the IDL documents themselves are bundled assets read from the seeds
//! directory, and a missing or malformed asset only skips its entry.

use std::path::Path;

use serde_json::Value;
use soldocs_core::{idl, Result};
use soldocs_store::Store;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SeedProgram {
    pub program_id: &'static str,
    pub label: &'static str,
    pub idl_file: &'static str,
}

pub const SEED_PROGRAMS: [SeedProgram; 7] = [
    SeedProgram {
        program_id: "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH",
        label: "Drift v2",
        idl_file: "drift.json",
    },
    SeedProgram {
        program_id: "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
        label: "Jupiter v6",
        idl_file: "jupiter.json",
    },
    SeedProgram {
        program_id: "MarBmsSgKXdrN1egZf5sqe1TMai9K1rChYNDJgjq7aD",
        label: "Marinade Staking",
        idl_file: "marinade.json",
    },
    SeedProgram {
        program_id: "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
        label: "Orca Whirlpool",
        idl_file: "whirlpool.json",
    },
    SeedProgram {
        program_id: "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s",
        label: "Metaplex Token Metadata",
        idl_file: "token_metadata.json",
    },
    SeedProgram {
        program_id: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
        label: "Raydium AMM v4",
        idl_file: "raydium_amm.json",
    },
    SeedProgram {
        program_id: "KLend2g3cP87fffoy8q1mQqGKjrxjC8boSyAYavgmjD",
        label: "Kamino Lend",
        idl_file: "kamino_lend.json",
    },
];

/// Seed the queue and IDL cache from the bundled list when the store is
/// empty. Returns the number of programs enqueued.
pub async fn seed_known_programs(store: &Store, seeds_dir: &Path) -> Result<usize> {
    if !store.list_queue().await?.is_empty() || !store.list_programs().await?.is_empty() {
        return Ok(0);
    }

    let mut seeded = 0;
    for seed in SEED_PROGRAMS {
        let path = seeds_dir.join(seed.idl_file);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(label = seed.label, path = %path.display(), error = %err, "Skipping seed without IDL asset");
                continue;
            }
        };
        let idl_doc: Value = match serde_json::from_slice(&raw) {
            Ok(idl_doc) => idl_doc,
            Err(err) => {
                warn!(label = seed.label, error = %err, "Skipping seed with unparseable IDL");
                continue;
            }
        };
        if !idl::has_instructions(&idl_doc) || idl::resolve_name(&idl_doc) == idl::UNKNOWN_PROGRAM {
            warn!(label = seed.label, "Skipping seed with invalid IDL shape");
            continue;
        }

        store.save_idl_safe(seed.program_id, idl_doc).await?;
        store.add_to_queue_safe(seed.program_id).await?;
        seeded += 1;
    }

    info!(seeded, "Seeded well-known programs");
    Ok(seeded)
}
