//! Batch API request preparation from exported slices.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GenerationConfig;
use crate::errors::CoreResult;
use crate::jsonl::write_jsonl_fresh;
use crate::models::{Scenario, Slice, SliceKind};

const SCENARIO1_SYSTEM: &str = "You are a senior software architect helping to create training data for code understanding. Generate question-answer pairs with detailed reasoning traces.";
const SCENARIO2_SYSTEM: &str = "You are a senior software architect helping to create training data for system design. Generate design solutions with detailed reasoning and decision traces.";

const SCENARIO1_SCHEMA: &str = r#"{
  "question": "A technical question about this code (what it does, how it works, or why it's designed this way)",
  "answer": "A detailed answer explaining the code",
  "reasoning_trace": {
    "steps": [
      {
        "step_number": 1,
        "description": "What analysis was done",
        "code_reference": "Specific code element referenced",
        "reasoning": "Why this step is important"
      }
    ],
    "conclusion": "Final understanding"
  },
  "business_rules": ["List of business rules extracted from the code"]
}"#;

const SCENARIO2_SCHEMA: &str = r#"{
  "requirement_analysis": {
    "title": "A feature that could use this pattern",
    "description": "Detailed description",
    "constraints": ["List of constraints"]
  },
  "design_solution": {
    "overview": "High-level design approach",
    "architecture": {
      "style": "Architecture style",
      "components": ["List of components"],
      "integration_points": ["Where the design hooks into the existing code"],
      "data_flow": "How data flows"
    },
    "implementation_plan": ["Step-by-step implementation"]
  },
  "reasoning_trace": {
    "analysis_steps": [
      {
        "step": 1,
        "analysis": "What was examined",
        "decision": "What was decided"
      }
    ],
    "decision_points": [
      {
        "decision": "Key decision made",
        "rationale": "Why this decision",
        "alternatives_considered": ["Other options"]
      }
    ],
    "design_rationale": "Why the overall design fits the existing architecture"
  }
}"#;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// One line of a batch API input file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

/// A written batch input file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreparedBatch {
    pub scenario: Scenario,
    pub path: PathBuf,
    pub requests: usize,
}

fn scenario1_prompt(slice: &Slice) -> String {
    format!(
        "Analyze the following code from {path}:\n\n```python\n{code}\n```\n\nContext:\n- Name: {name}\n- Type: {kind}\n- Complexity: {complexity}\n- Docstring: {doc}\n\nPlease generate a Q&A pair about this code with the following structure in JSON format:\n\n{schema}\n\nGenerate the response in valid JSON format only.",
        path = slice.file_path,
        code = slice.code_snippet,
        name = slice.name,
        kind = slice.kind,
        complexity = slice.complexity,
        doc = slice.context.docstring().unwrap_or("None"),
        schema = SCENARIO1_SCHEMA,
    )
}

fn scenario2_prompt(slice: &Slice) -> String {
    format!(
        "Analyze the following code pattern from {path}:\n\n```python\n{code}\n```\n\nThis code demonstrates a specific architectural pattern or design approach.\n\nPlease generate a design solution that someone might implement based on this pattern:\n\n{schema}\n\nGenerate the response in valid JSON format only.",
        path = slice.file_path,
        code = slice.code_snippet,
        schema = SCENARIO2_SCHEMA,
    )
}

/// Renders slices into batch API requests.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    config: GenerationConfig,
}

impl RequestBuilder {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// Slice type feeding each scenario.
    pub fn source_kind(scenario: Scenario) -> Option<SliceKind> {
        match scenario {
            Scenario::Scenario1 => Some(SliceKind::Function),
            Scenario::Scenario2 => Some(SliceKind::Class),
            Scenario::Unknown => None,
        }
    }

    fn cap(&self, scenario: Scenario) -> usize {
        match scenario {
            Scenario::Scenario1 => self.config.max_scenario1_items,
            Scenario::Scenario2 => self.config.max_scenario2_items,
            Scenario::Unknown => 0,
        }
    }

    /// The first slices of the scenario's type, up to the configured cap.
    pub fn select<'a>(&self, slices: &'a [Slice], scenario: Scenario) -> Vec<&'a Slice> {
        let Some(kind) = Self::source_kind(scenario) else {
            return Vec::new();
        };
        slices
            .iter()
            .filter(|s| s.kind == kind)
            .take(self.cap(scenario))
            .collect()
    }

    pub fn build(&self, scenario: Scenario, slice: &Slice) -> BatchRequest {
        let (system, prompt) = match scenario {
            Scenario::Scenario2 => (SCENARIO2_SYSTEM, scenario2_prompt(slice)),
            _ => (SCENARIO1_SYSTEM, scenario1_prompt(slice)),
        };
        BatchRequest {
            custom_id: scenario.custom_id(&slice.id),
            method: "POST".to_string(),
            url: self.config.endpoint_url.clone(),
            body: RequestBody {
                model: self.config.model.clone(),
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: system.to_string(),
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: prompt,
                    },
                ],
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        }
    }

    /// Write `{scenario}_batch_input_{timestamp}.jsonl` for each scenario
    /// that has at least one eligible slice.
    pub fn prepare(&self, slices: &[Slice], output_dir: &Path) -> CoreResult<Vec<PreparedBatch>> {
        let mut prepared = Vec::new();
        for scenario in [Scenario::Scenario1, Scenario::Scenario2] {
            let selected = self.select(slices, scenario);
            info!("{} slices selected: {}", scenario, selected.len());
            if selected.is_empty() {
                continue;
            }
            let requests: Vec<BatchRequest> =
                selected.into_iter().map(|s| self.build(scenario, s)).collect();
            let stem = format!("{scenario}_batch_input");
            let path = write_jsonl_fresh(output_dir, &stem, &requests)?;
            info!("Exported {} batch requests to {}", requests.len(), path.display());
            prepared.push(PreparedBatch {
                scenario,
                path,
                requests: requests.len(),
            });
        }
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::read_jsonl;
    use crate::models::{slice_id, Complexity, SliceContext, SliceMetadata};
    use serde_json::Map;

    fn slice(ordinal: usize, kind: SliceKind) -> Slice {
        let context = match kind {
            SliceKind::Function => SliceContext::Function {
                docstring: Some("Add numbers.".into()),
                parameters: vec!["a".into(), "b".into()],
                returns: None,
                decorators: vec![],
            },
            SliceKind::Class => SliceContext::Class {
                docstring: None,
                base_classes: vec![],
                methods: vec!["get".into()],
                decorators: vec![],
            },
        };
        Slice {
            id: slice_id("repo", ordinal, kind),
            kind,
            repository: "repo".into(),
            file_path: "calc.py".into(),
            name: format!("e{ordinal}"),
            start_line: 1,
            end_line: 2,
            code_snippet: "def add(a, b):\n    return a + b".into(),
            complexity: Complexity::Simple,
            context,
            metadata: SliceMetadata {
                sliced_at: "t".into(),
                analyzer_version: "1.0".into(),
                content_hash: None,
                extra: Map::new(),
            },
        }
    }

    #[test]
    fn test_build_scenario1_request() {
        let builder = RequestBuilder::new(GenerationConfig::default());
        let request = builder.build(Scenario::Scenario1, &slice(0, SliceKind::Function));
        assert_eq!(request.custom_id, "scenario1_repo_00000_func");
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/v1/chat/completions");
        assert_eq!(request.body.model, "gpt-4o-mini");
        assert_eq!(request.body.messages[0].role, "system");
        let prompt = &request.body.messages[1].content;
        assert!(prompt.starts_with("Analyze the following code from calc.py:"));
        assert!(prompt.contains("- Docstring: Add numbers."));
        assert!(prompt.contains("\"reasoning_trace\""));
    }

    #[test]
    fn test_select_respects_kind_and_cap() {
        let config = GenerationConfig {
            max_scenario1_items: 2,
            max_scenario2_items: 5,
            ..GenerationConfig::default()
        };
        let builder = RequestBuilder::new(config);
        let slices: Vec<Slice> = (0..4)
            .map(|i| slice(i, SliceKind::Function))
            .chain([slice(4, SliceKind::Class)])
            .collect();
        assert_eq!(builder.select(&slices, Scenario::Scenario1).len(), 2);
        assert_eq!(builder.select(&slices, Scenario::Scenario2).len(), 1);
        assert!(builder.select(&slices, Scenario::Unknown).is_empty());
    }

    #[test]
    fn test_prepare_writes_one_file_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let builder = RequestBuilder::new(GenerationConfig::default());
        let slices = vec![slice(0, SliceKind::Function), slice(1, SliceKind::Function)];

        let prepared = builder.prepare(&slices, dir.path()).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].scenario, Scenario::Scenario1);
        let name = prepared[0].path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("scenario1_batch_input_"));

        let written: Vec<BatchRequest> = read_jsonl(&prepared[0].path).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1].custom_id, "scenario1_repo_00001_func");
    }
}
