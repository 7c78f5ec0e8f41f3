//! Tool Descriptors
//!
//! Provider-neutral description of the tools advertised by a tool session,
//! and the translation of those descriptors into each provider's wire shape.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{BridgeError, Result};
use crate::provider::ProviderKind;

/// A tool advertised by the tool-hosting session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    #[serde(default)]
    pub description: String,

    /// JSON schema of the tool's arguments
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({})
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Build a descriptor from one entry of an MCP `tools/list` result
    pub fn from_listing(entry: &Value) -> Result<Self> {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| BridgeError::InvalidToolDescriptor(format!("tool missing name: {entry}")))?;

        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let input_schema = entry.get("inputSchema").cloned().unwrap_or_else(empty_schema);

        Ok(Self::new(name, description, input_schema))
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BridgeError::InvalidToolDescriptor(
                "tool descriptor has an empty name".into(),
            ));
        }
        Ok(())
    }
}

/// Format A tool definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Format B tool definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

/// Function body of a format B tool definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool list in one provider's wire shape
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderToolSchema {
    Anthropic(Vec<AnthropicTool>),
    OpenAi(Vec<OpenAiTool>),
}

impl ProviderToolSchema {
    pub fn len(&self) -> usize {
        match self {
            Self::Anthropic(tools) => tools.len(),
            Self::OpenAi(tools) => tools.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the descriptors back off the wire shape
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        match self {
            Self::Anthropic(tools) => tools
                .iter()
                .map(|t| ToolDescriptor::new(&t.name, &t.description, t.input_schema.clone()))
                .collect(),
            Self::OpenAi(tools) => tools
                .iter()
                .map(|t| {
                    ToolDescriptor::new(
                        &t.function.name,
                        &t.function.description,
                        t.function.parameters.clone(),
                    )
                })
                .collect(),
        }
    }
}

/// Convert descriptors into the wire shape expected by `provider`
pub fn to_wire_schema(tools: &[ToolDescriptor], provider: ProviderKind) -> Result<ProviderToolSchema> {
    for tool in tools {
        tool.validate()?;
    }

    let schema = match provider {
        ProviderKind::Anthropic => ProviderToolSchema::Anthropic(
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
        ),
        ProviderKind::OpenAi => ProviderToolSchema::OpenAi(
            tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function".into(),
                    function: OpenAiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
        ),
    };

    Ok(schema)
}

/// Ordered set of tools advertised by one connection
#[derive(Clone, Debug, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub const fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Tool names in advertised order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn as_slice(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Human-readable listing, one tool per line
    pub fn describe(&self) -> String {
        if self.tools.is_empty() {
            return "No tools available.".into();
        }

        let mut listing = String::from("Available tools:\n");
        for tool in &self.tools {
            if tool.description.is_empty() {
                listing.push_str(&format!("  - {}\n", tool.name));
            } else {
                let summary = tool.description.lines().next().unwrap_or_default().trim();
                listing.push_str(&format!("  - {}: {}\n", tool.name, summary));
            }
        }
        listing
    }
}
