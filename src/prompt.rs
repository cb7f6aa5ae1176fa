use crate::bundle::ExportBundle;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Characters of export kept before the first gateway tag
pub const SNIPPET_CHARS_BEFORE: usize = 800;
/// Characters of export kept from the first gateway tag onwards
pub const SNIPPET_CHARS_AFTER: usize = 5000;
/// Characters of export kept when no gateway tag is found
pub const SNIPPET_FALLBACK_CHARS: usize = 6000;

static GATEWAY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<MultiProtocolGateway[^>]*name=['"][^'"]+['"][^>]*>"#)
        .expect("gateway tag pattern should compile")
});

const SYSTEM_PROMPT: &str = "You are a senior IBM DataPower engineer. \
Convert a legacy DataPower service export into a new service that conforms to the provided Target framework. \
We deploy ONLY to DataPower PHYSICAL appliances (no container-only features). \
Prefer GatewayScript and XSLT 1.0 compatibility.";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of a chat-completion conversation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Build the system/user conversation for one conversion run
pub fn build_prompt(
    app: &str,
    bundle: &ExportBundle,
    framework_ctx: &BTreeMap<String, String>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(app, bundle, framework_ctx)),
    ]
}

fn build_user_prompt(
    app: &str,
    bundle: &ExportBundle,
    framework_ctx: &BTreeMap<String, String>,
) -> String {
    let gateways = if bundle.mpgw_names.is_empty() {
        "(none detected)".to_string()
    } else {
        bundle.mpgw_names.join(", ")
    };

    // BTreeMap keys are already sorted
    let local_file_list = bundle
        .local_files
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    let framework_files = framework_ctx
        .keys()
        .filter(|key| !key.starts_with('_'))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "INPUTS\n- App name: {app}\n- Legacy export.xml path: {}\n- MPGW(s) detected: {gateways}\n\n",
        bundle.export_xml_path.display()
    );

    push_section(
        &mut prompt,
        "LEGACY EXPORT SNIPPET (for object names / policy wiring)",
        "EXPORT SNIPPET",
        export_snippet(&bundle.export_xml_text),
    );
    push_section(
        &mut prompt,
        "LEGACY local:/// FILES (available to you)",
        "LOCAL FILE LIST",
        &local_file_list,
    );
    push_section(
        &mut prompt,
        "LEGACY local:/// FILE CONTENTS",
        "LOCAL FILES",
        &to_json(&bundle.local_files),
    );
    push_section(
        &mut prompt,
        "TARGET FRAMEWORK FILE LIST (existing)",
        "TARGET FRAMEWORK FILE LIST",
        &framework_files,
    );
    push_section(
        &mut prompt,
        "TARGET FRAMEWORK CONTENTS (existing)",
        "TARGET FRAMEWORK CONTENTS",
        &to_json(framework_ctx),
    );

    prompt.push_str(&task_and_format(app));
    prompt.trim().to_string()
}

fn push_section(prompt: &mut String, heading: &str, label: &str, body: &str) {
    prompt.push_str(&format!(
        "{heading}\n---BEGIN {label}---\n{body}\n---END {label}---\n\n"
    ));
}

fn to_json(map: &BTreeMap<String, String>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn task_and_format(app: &str) -> String {
    format!(
        r#"TASK
- Produce a target-structure conversion for this legacy service.
- Use the Target framework conventions (GWS shared JS, XSL shared XSLT, common error handling).
- Keep names deterministic and easy to diff (no random suffixes).

OUTPUT FORMAT (STRICT)
Return ONLY valid JSON (no markdown) with this shape:
{{
  "summary": "short text",
  "files": [
    {{
      "path": "Target/<app>/<service>/.../file.ext",
      "content": "full file content as a string"
    }}
  ]
}}

Rules:
- Every path must be relative to the repo root.
- Do not modify existing Target/Framework/* files; create app/service-specific files under Target/{app}/...
- If you need to update Target/MPGW_GWS_Framework.xml, instead output a NEW file under Target/{app}/... and say how it is referenced in summary.
"#
    )
}

/// Slice of the export around the first gateway definition
///
/// Takes up to 800 characters before the first `<MultiProtocolGateway ... name="...">`
/// tag and 5000 from its start; without such a tag, the first 6000 characters.
pub fn export_snippet(text: &str) -> &str {
    match GATEWAY_TAG.find(text) {
        Some(m) => {
            let pos = m.start();
            let start = text[..pos]
                .char_indices()
                .rev()
                .take(SNIPPET_CHARS_BEFORE)
                .last()
                .map_or(pos, |(i, _)| i);
            let end = text[pos..]
                .char_indices()
                .nth(SNIPPET_CHARS_AFTER)
                .map_or(text.len(), |(i, _)| pos + i);
            &text[start..end]
        }
        None => {
            let end = text
                .char_indices()
                .nth(SNIPPET_FALLBACK_CHARS)
                .map_or(text.len(), |(i, _)| i);
            &text[..end]
        }
    }
}
