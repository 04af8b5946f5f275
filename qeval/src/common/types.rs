use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::MAX_ALLOWED_ENTRIES;
use crate::error::{PipelineError, PipelineResult};

/// One benchmark question with its expected answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub question: String,
    pub ground_truth: String,
}

/// Validated, size-bounded batch of test cases
#[derive(Debug, Clone, PartialEq)]
pub struct TestSet {
    cases: Vec<TestCase>,
}

impl TestSet {
    pub fn new(cases: Vec<TestCase>) -> PipelineResult<Self> {
        if cases.len() > MAX_ALLOWED_ENTRIES {
            return Err(PipelineError::configuration(format!(
                "Maximum allowed entries exceeded: got {}, limit is {}",
                cases.len(),
                MAX_ALLOWED_ENTRIES
            )));
        }
        Ok(Self { cases })
    }

    /// Parse `{"testset": [{"question": .., "ground_truth": ..}, ..]}`.
    pub fn from_event(event: &Value) -> PipelineResult<Self> {
        let testset = event.get("testset").ok_or_else(|| {
            PipelineError::configuration("expected field testset was not found in the event")
        })?;
        let cases: Vec<TestCase> = serde_json::from_value(testset.clone())
            .map_err(|e| PipelineError::configuration(format!("malformed testset: {}", e)))?;
        Self::new(cases)
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn questions(&self) -> Vec<String> {
        self.cases.iter().map(|c| c.question.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// A single chat request against the Q application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub application_id: String,
    pub message: String,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
}

impl ChatRequest {
    pub fn new(application_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            message: message.into(),
            conversation_id: None,
            parent_message_id: None,
        }
    }
}

/// Raw chat response as returned by the chat service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub conversation_id: Option<String>,
    pub system_message: Option<String>,
    pub system_message_id: Option<String>,
    pub user_message_id: Option<String>,
    pub source_attributions: Option<Vec<SourceAttribution>>,
}

/// A retrieval citation attached to a chat answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttribution {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
    pub citation_number: Option<i32>,
}

/// One row of the dataset handed to the scoring framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub question: String,
    pub answer: String,
    pub ground_truth: String,
    pub contexts: Vec<String>,
}

/// Tabular evaluation dataset with columns question/answer/ground_truth/contexts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationDataset {
    pub rows: Vec<DatasetRow>,
}

impl EvaluationDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
