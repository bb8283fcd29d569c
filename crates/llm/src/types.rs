use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Request ──────────────────────────────────────────────────────────────────

/// One provider call.  Optional parameter groups are nested objects, not
/// top-level flags, and are omitted from the wire entirely when unset so an
/// older model never sees them.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRequest {
    pub model: String,
    /// Either a plain prompt string or an array of input items (the planner
    /// sends `computer_call_output` items with screenshots).
    pub input: Value,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>, input: Value, max_output_tokens: u32) -> Self {
        Self {
            model: model.into(),
            input,
            max_output_tokens,
            temperature: None,
            text: None,
            reasoning: None,
            service_tier: None,
            previous_response_id: None,
            tools: Vec::new(),
            truncation: None,
        }
    }

    /// Drop every optional parameter group.  Used for the one retry after an
    /// unsupported-parameter rejection.
    pub fn without_optional_params(mut self) -> Self {
        self.temperature = None;
        self.text = None;
        self.reasoning = None;
        self.service_tier = None;
        self
    }
}

/// Nested text-configuration group: verbosity plus an optional structured
/// output format.
#[derive(Debug, Clone, Serialize)]
pub struct TextConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningConfig {
    pub effort: String,
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub output: Vec<ResponseItem>,
    /// Aggregated assistant text, when the provider supplies it.
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl LlmResponse {
    /// The assistant text of this response: the aggregated field when
    /// present, otherwise message-item text concatenated in output order.
    /// Reasoning and unknown items are never part of the result.
    pub fn text(&self) -> String {
        if let Some(text) = &self.output_text {
            if !text.is_empty() {
                return text.clone();
            }
        }

        let mut combined = String::new();
        for item in &self.output {
            if let ResponseItem::Message { content, .. } = item {
                for part in content {
                    if let ContentPart::OutputText { text } = part {
                        combined.push_str(text);
                    }
                }
            }
        }
        combined
    }

    /// First pending computer action, when the planner asked for one.
    pub fn computer_call(&self) -> Option<(&str, &ComputerAction)> {
        self.output.iter().find_map(|item| match item {
            ResponseItem::ComputerCall { call_id, action, .. } => {
                Some((call_id.as_str(), action))
            }
            _ => None,
        })
    }
}

/// Closed sum over response output items.  The provider interleaves
/// reasoning, message, and action items in one array and gives no ordering
/// guarantee, so parsing is always by tag — never by index.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Reasoning {
        #[serde(default)]
        id: String,
    },
    Message {
        #[serde(default)]
        id: String,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        #[serde(default)]
        call_id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
    },
    ComputerCall {
        #[serde(default)]
        call_id: String,
        action: ComputerAction,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText {
        text: String,
    },
    Refusal {
        #[serde(default)]
        refusal: String,
    },
    #[serde(other)]
    Unknown,
}

/// Low-level UI action requested by the computer-use planner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerAction {
    Click {
        x: i64,
        y: i64,
        #[serde(default)]
        button: Option<String>,
    },
    DoubleClick {
        x: i64,
        y: i64,
    },
    Type {
        text: String,
    },
    Keypress {
        keys: Vec<String>,
    },
    Scroll {
        x: i64,
        y: i64,
        #[serde(default)]
        scroll_x: i64,
        #[serde(default)]
        scroll_y: i64,
    },
    Move {
        x: i64,
        y: i64,
    },
    Wait,
    Screenshot,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}
