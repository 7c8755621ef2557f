//! Four-block output bundle.
//!
//! | Block | Content | Present |
//! |-------|---------|---------|
//! | `1) DISCOVERY` | discovery document with limitations | always |
//! | `2) TOOLS` | `{"tools": [...], "skipped": [...]}` | always |
//! | `3) MCP_CONFIG` | `mcpServers` client template | always |
//! | `4) SQL_JSON` | `{sql, executed, execution_result, notes, insert_sql?}` | provisioning requested |
//!
//! Each block is a standalone JSON document. Credential fields stay as
//! placeholders unless the operator supplied them, and anything shaped
//! like a personal access token is redacted from free text.

use crate::session::SessionInputs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use supaforge_compiler::{CompileOutput, Skipped};
use supaforge_core::{
    DiscoveryDocument, DiscoverySnapshot, Limitation, McpClientConfig, ToolDescriptor,
};

pub const PLACEHOLDER_PROJECT_URL: &str = "<PROJECT_URL>";
pub const PLACEHOLDER_ANON_KEY: &str = "<ANON_KEY_OR_placeholder>";
pub const PLACEHOLDER_EMAIL: &str = "<USER_EMAIL_placeholder>";
pub const PLACEHOLDER_PASSWORD: &str = "<USER_PASSWORD_placeholder>";

/// Prefix of Supabase personal access tokens.
const ACCESS_TOKEN_PREFIX: &str = "sbp_";

/// Tool name for limitations recorded by the workflow itself.
pub const DISCOVERY_LIMITATION_TOOL: &str = "discovery";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsBlock {
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlBlock {
    pub sql: String,
    pub executed: bool,
    pub execution_result: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_sql: Option<String>,
}

/// Whatever the stages produced before the session ended.
#[derive(Debug, Clone, Default)]
pub struct StageResults {
    pub snapshot: Option<DiscoverySnapshot>,
    /// Limitations raised by the workflow (failed or retried discovery).
    pub workflow_limitations: Vec<Limitation>,
    pub compiled: Option<CompileOutput>,
    pub sql: Option<SqlBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBundle {
    pub discovery: DiscoveryDocument,
    pub tools: ToolsBlock,
    pub mcp_config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<SqlBlock>,
}

impl OutputBundle {
    /// Labelled blocks in output order.
    pub fn blocks(&self) -> serde_json::Result<Vec<(&'static str, Value)>> {
        let mut blocks = vec![
            ("1) DISCOVERY", serde_json::to_value(&self.discovery)?),
            ("2) TOOLS", serde_json::to_value(&self.tools)?),
            ("3) MCP_CONFIG", self.mcp_config.clone()),
        ];
        if let Some(sql) = &self.sql {
            blocks.push(("4) SQL_JSON", serde_json::to_value(sql)?));
        }
        Ok(blocks)
    }

    /// Blocks as text: each label on its own line followed by pretty JSON.
    pub fn render(&self) -> serde_json::Result<String> {
        let mut parts = Vec::new();
        for (label, value) in self.blocks()? {
            parts.push(format!("{}\n{}", label, serde_json::to_string_pretty(&value)?));
        }
        Ok(parts.join("\n\n"))
    }
}

/// Build the bundle from stage results.
pub fn assemble(mcp: &McpClientConfig, inputs: &SessionInputs, results: &StageResults) -> OutputBundle {
    let mut discovery = results
        .snapshot
        .as_ref()
        .map(DiscoverySnapshot::to_document)
        .unwrap_or_default();
    discovery
        .limitations
        .extend(results.workflow_limitations.iter().cloned());
    for limitation in &mut discovery.limitations {
        limitation.error = redact_access_tokens(&limitation.error);
    }

    let tools = results
        .compiled
        .as_ref()
        .map(|c| ToolsBlock {
            tools: c.tools.clone(),
            skipped: c.skipped.clone(),
        })
        .unwrap_or_default();

    let sql = results.sql.as_ref().map(|block| SqlBlock {
        sql: block.sql.clone(),
        executed: block.executed,
        execution_result: block.execution_result.as_deref().map(redact_access_tokens),
        notes: block.notes.iter().map(|n| redact_access_tokens(n)).collect(),
        insert_sql: block.insert_sql.clone(),
    });

    OutputBundle {
        discovery,
        tools,
        mcp_config: mcp_config(mcp, inputs),
        sql,
    }
}

/// `mcpServers` entry pointing an MCP client at the project.
///
/// End-user credentials stay placeholders; the owner email is never
/// written here.
pub fn mcp_config(mcp: &McpClientConfig, inputs: &SessionInputs) -> Value {
    let url = inputs
        .project_url
        .clone()
        .or_else(|| {
            inputs
                .project_ref
                .as_ref()
                .map(|r| format!("https://{}.supabase.co", r))
        })
        .unwrap_or_else(|| PLACEHOLDER_PROJECT_URL.to_string());
    let anon_key = inputs
        .anon_key
        .clone()
        .unwrap_or_else(|| PLACEHOLDER_ANON_KEY.to_string());
    let server = json!({
        "command": mcp.command,
        "args": [
            "-y", mcp.package,
            "--url", url,
            "--anon-key", anon_key,
            "--email", PLACEHOLDER_EMAIL,
            "--password", PLACEHOLDER_PASSWORD,
        ],
    });
    let mut servers = Map::new();
    servers.insert(mcp.server_name.clone(), server);
    json!({ "mcpServers": servers })
}

/// Replace every `sbp_...` word in `text`.
pub fn redact_access_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(ACCESS_TOKEN_PREFIX) {
        let at_word_start = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_');
        out.push_str(&rest[..pos]);
        let token = &rest[pos..];
        let end = token
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(token.len());
        if at_word_start && end > ACCESS_TOKEN_PREFIX.len() {
            out.push_str(ACCESS_TOKEN_PREFIX);
            out.push_str("<redacted>");
        } else {
            out.push_str(&token[..end]);
        }
        rest = &token[end..];
    }
    out.push_str(rest);
    out
}
