//! Prompt templates for the four documentation passes.

use serde_json::Value;
use soldocs_core::idl;

/// Embedded IDL JSON is capped so a large program cannot blow the context
/// window.
pub const IDL_PROMPT_LIMIT: usize = 15_000;

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((boundary, _)) => &text[..boundary],
        None => text,
    }
}

fn idl_json_snippet(idl: &Value) -> String {
    let rendered = serde_json::to_string_pretty(idl).unwrap_or_default();
    truncate_chars(&rendered, IDL_PROMPT_LIMIT).to_string()
}

pub fn overview_prompt(name: &str, idl: &Value) -> String {
    format!(
        "You are documenting the Solana program \"{name}\".\n\
         It defines {instructions} instructions, {accounts} account types, \
         {types} custom types, {events} events, and {errors} error codes.\n\n\
         Write a concise markdown overview of what this program does, who would \
         use it, and how its pieces fit together. Start from its IDL:\n\n\
         ```json\n{idl_json}\n```",
        instructions = idl::array_len(idl, "instructions"),
        accounts = idl::array_len(idl, "accounts"),
        types = idl::array_len(idl, "types"),
        events = idl::array_len(idl, "events"),
        errors = idl::array_len(idl, "errors"),
        idl_json = idl_json_snippet(idl),
    )
}

pub fn instructions_prompt(name: &str, batch: &[Value]) -> String {
    format!(
        "Document the following instructions of the Solana program \"{name}\".\n\
         For each instruction produce: a \"### <name>\" heading, a short \
         description, a table of the accounts it takes, a table of its \
         arguments, and a short usage example in a fenced code block.\n\n\
         Instructions (JSON):\n\n```json\n{batch_json}\n```",
        batch_json = serde_json::to_string_pretty(batch).unwrap_or_default(),
    )
}

pub fn accounts_prompt(name: &str, idl: &Value) -> String {
    let mut prompt = format!(
        "Document the account types and custom types of the Solana program \
         \"{name}\" in markdown: one \"### <name>\" section per type with a \
         field table.\n\n\
         Accounts (JSON):\n\n```json\n{accounts}\n```\n\n\
         Types (JSON):\n\n```json\n{types}\n```",
        accounts = section_json(idl, "accounts"),
        types = section_json(idl, "types"),
    );
    if idl::array_len(idl, "events") > 0 {
        prompt.push_str(&format!(
            "\n\nEvents (JSON):\n\n```json\n{}\n```",
            section_json(idl, "events")
        ));
    }
    if idl::array_len(idl, "errors") > 0 {
        prompt.push_str(&format!(
            "\n\nError codes (JSON):\n\n```json\n{}\n```",
            section_json(idl, "errors")
        ));
    }
    prompt
}

pub fn security_prompt(name: &str, idl: &Value) -> String {
    format!(
        "Review the Solana program \"{name}\" from a security perspective: \
         authority and signer checks, privileged instructions, upgrade and \
         freeze paths, and anything a caller should verify before trusting it. \
         This review is based on static IDL analysis only; flag that limitation \
         in your output.\n\n\
         IDL:\n\n```json\n{idl_json}\n```",
        idl_json = idl_json_snippet(idl),
    )
}

fn section_json(idl: &Value, key: &str) -> String {
    idl.get(key)
        .map(|section| serde_json::to_string_pretty(section).unwrap_or_default())
        .unwrap_or_else(|| "[]".to_string())
}
