//! Prompt text for the two model calls

use stride_model::ThreatCategory;

/// System message sent with the extraction call
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You always return valid JSON.";

/// Instruction sent with the diagram image
pub const EXTRACTION_PROMPT: &str = r#"You are an expert in software architecture and security.
Analyze the architecture diagram image and extract its main components.
Return the result as strict JSON in this format:
{
    "components": [
        {"id": "c1", "label": "component name", "type": "type, e.g. web_server, database, service", "bbox": [x, y, w, h]}
    ],
    "graph": {
        "nodes": ["c1", "c2"],
        "edges": [["c1", "c2"], ["c2", "c3"]]
    }
}
If you do not know the position (bbox), use [0,0,0,0]."#;

/// Instruction for one (category, component) enrichment
#[must_use]
pub fn enrichment_prompt(category: ThreatCategory, label: &str, component_type: &str) -> String {
    format!(
        r#"You are a systems security expert. For the component "{label}" (type={component_type}),
describe the risk of the threat "{category}" and give mitigation strategies.
Return the answer **only** as valid JSON in the following format:

{{
  "description": "Detailed description of the threat's risk.",
  "mitigation": "Practical mitigation strategies."
}}

Be concise but complete."#
    )
}
