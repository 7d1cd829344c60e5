//! The four-pass documentation pipeline: overview, batched instructions,
//! accounts & types, security. A Documentation record exists iff every
//! pass succeeded.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use soldocs_core::{idl, Documentation, Result, SolDocsError};
use soldocs_llm::{TextGenerator, DEFAULT_MAX_TOKENS};
use tracing::warn;

use crate::prompts;

/// Instructions are documented at most five at a time.
pub const BATCH_SIZE: usize = 5;

const BATCH_JOIN: &str = "\n\n---\n\n";
const SECTION_JOIN: &str = "\n---\n";

/// Substituted for the accounts pass when the IDL defines no account
/// material at all.
pub const NO_ACCOUNTS_PLACEHOLDER: &str =
    "No account types, custom types, events, or error codes are defined by this program.";

const MIN_EXPECTED_MARKDOWN: usize = 500;

pub struct DocGenerator {
    llm: Arc<dyn TextGenerator>,
}

impl DocGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        idl_doc: &Value,
        program_id: &str,
        idl_hash: &str,
    ) -> Result<Documentation> {
        let name = idl::resolve_name(idl_doc);
        if name == idl::UNKNOWN_PROGRAM {
            return Err(SolDocsError::InvalidIdl(
                "IDL carries no usable program name".to_string(),
            ));
        }

        let overview = self
            .llm
            .generate(&prompts::overview_prompt(&name, idl_doc), DEFAULT_MAX_TOKENS)
            .await?;

        let instructions = self.generate_instructions(&name, idl_doc).await?;

        let accounts = if has_account_material(idl_doc) {
            self.llm
                .generate(&prompts::accounts_prompt(&name, idl_doc), DEFAULT_MAX_TOKENS)
                .await?
        } else {
            NO_ACCOUNTS_PLACEHOLDER.to_string()
        };

        let security = self
            .llm
            .generate(&prompts::security_prompt(&name, idl_doc), DEFAULT_MAX_TOKENS)
            .await?;

        let generated_at = Utc::now();
        let full_markdown = assemble_markdown(
            &name,
            program_id,
            &generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            [&overview, &instructions, &accounts, &security],
        );

        if full_markdown.len() < MIN_EXPECTED_MARKDOWN {
            warn!(
                program_id,
                len = full_markdown.len(),
                "Generated documentation is suspiciously short"
            );
        }
        if !full_markdown.contains("```") {
            warn!(program_id, "Generated documentation has no code examples");
        }

        Ok(Documentation {
            program_id: program_id.to_string(),
            name,
            overview,
            instructions,
            accounts,
            security,
            full_markdown,
            generated_at,
            idl_hash: idl_hash.to_string(),
        })
    }

    async fn generate_instructions(&self, name: &str, idl_doc: &Value) -> Result<String> {
        let instructions = idl_doc
            .get("instructions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut outputs = Vec::new();
        for batch in instructions.chunks(BATCH_SIZE) {
            let output = self
                .llm
                .generate(&prompts::instructions_prompt(name, batch), DEFAULT_MAX_TOKENS)
                .await?;
            outputs.push(output);
        }
        Ok(outputs.join(BATCH_JOIN))
    }
}

fn has_account_material(idl_doc: &Value) -> bool {
    ["accounts", "types", "events", "errors"]
        .iter()
        .any(|key| idl::array_len(idl_doc, key) > 0)
}

fn assemble_markdown(
    name: &str,
    program_id: &str,
    generated_at: &str,
    sections: [&str; 4],
) -> String {
    let header = format!(
        "# {name}\n\nProgram ID: `{program_id}`\n\nGenerated at: {generated_at}\n\nGenerated by SolDocs"
    );
    let footer = "*Documentation generated autonomously by SolDocs.*".to_string();

    let mut parts = vec![header];
    parts.extend(sections.iter().map(|section| section.to_string()));
    parts.push(footer);
    parts.join(SECTION_JOIN)
}
