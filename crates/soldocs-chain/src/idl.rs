//! Anchor IDL account resolution: derive the IDL address for a program and
//! decode the compressed JSON document stored in it.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde_json::Value;
use solana_pubkey::Pubkey;
use soldocs_core::{idl, Result, SolDocsError};
use tracing::debug;

use crate::client::ChainRpc;

pub const IDL_SEED: &str = "anchor:idl";

/// Header sizes seen in the wild, newest first: discriminator + authority +
/// length, discriminator + length, and a bare discriminator.
const HEADER_OFFSETS: [usize; 3] = [44, 12, 8];

const MAX_IDL_LEN: usize = 10_000_000;

/// The anchor convention: the IDL lives at an address seeded from the
/// program's own derived base.
pub fn derive_idl_address(program_id: &str) -> Result<String> {
    let program: Pubkey = program_id
        .parse()
        .map_err(|_| SolDocsError::Validation(format!("Invalid program id: {program_id:?}")))?;
    let (base, _bump) = Pubkey::find_program_address(&[], &program);
    let idl_address = Pubkey::create_with_seed(&base, IDL_SEED, &program)
        .map_err(|err| SolDocsError::Rpc(format!("IDL address derivation failed: {err}")))?;
    Ok(idl_address.to_string())
}

/// Probe the known header offsets for a `u32` little-endian length followed
/// by a zlib-deflated JSON document. A candidate is accepted only when it
/// inflates, parses, and carries a non-empty `instructions` array.
pub fn decode_idl_account(data: &[u8]) -> Option<Value> {
    for offset in HEADER_OFFSETS {
        if data.len() < offset + 4 {
            continue;
        }
        let declared = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        if declared == 0 || declared > data.len() - offset - 4 || declared > MAX_IDL_LEN {
            continue;
        }

        let compressed = &data[offset + 4..offset + 4 + declared];
        let mut json = Vec::new();
        if ZlibDecoder::new(compressed).read_to_end(&mut json).is_err() {
            continue;
        }
        let Ok(candidate) = serde_json::from_slice::<Value>(&json) else {
            continue;
        };
        if idl::has_instructions(&candidate) {
            debug!(offset, declared, "Decoded IDL account");
            return Some(candidate);
        }
    }
    None
}

/// Fetch and decode a program's on-chain IDL. `Ok(None)` when the account
/// is missing or holds nothing decodable.
pub async fn fetch_idl(client: &dyn ChainRpc, program_id: &str) -> Result<Option<Value>> {
    let address = derive_idl_address(program_id)?;
    let Some(account) = client.get_account(&address).await? else {
        return Ok(None);
    };
    Ok(decode_idl_account(&account.data))
}
