use std::collections::HashMap;
use tracing::warn;

use crate::common::{ChatResponse, DatasetRow, EvaluationDataset, TestSet};

/// The generated answer of a chat response.
pub fn extract_answer(response: &ChatResponse) -> Option<String> {
    response.system_message.clone()
}

/// Citation snippets of a chat response, in citation order.
///
/// A response without citations yields an empty list and a warning.
pub fn extract_contexts(response: &ChatResponse) -> Vec<String> {
    let citations = match response.source_attributions.as_deref() {
        Some(citations) if !citations.is_empty() => citations,
        _ => {
            warn!(
                "No source attributions in response for conversation {:?}",
                response.conversation_id
            );
            return Vec::new();
        }
    };

    citations
        .iter()
        .filter_map(|c| c.snippet.as_deref())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pair every test case with its answer and contexts.
pub fn shape_dataset(
    testset: &TestSet,
    responses: &HashMap<String, ChatResponse>,
) -> EvaluationDataset {
    let rows = testset
        .cases()
        .iter()
        .map(|case| {
            let response = responses.get(&case.question);
            if response.is_none() {
                warn!("No response recorded for question {:?}", case.question);
            }
            DatasetRow {
                question: case.question.clone(),
                answer: response.and_then(extract_answer).unwrap_or_default(),
                ground_truth: case.ground_truth.clone(),
                contexts: response.map(extract_contexts).unwrap_or_default(),
            }
        })
        .collect();

    EvaluationDataset { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{SourceAttribution, TestCase};
    use crate::testing::test_chat_response;

    fn contexts_of(responses: &[ChatResponse]) -> Vec<Vec<String>> {
        responses.iter().map(extract_contexts).collect()
    }

    #[test]
    fn test_contexts_from_single_citation() {
        assert_eq!(
            contexts_of(&[test_chat_response()]),
            vec![vec!["data snippet".to_string()]]
        );
    }

    #[test]
    fn test_missing_citations_give_empty_contexts() {
        let without = ChatResponse {
            source_attributions: None,
            ..test_chat_response()
        };
        let empty = ChatResponse {
            source_attributions: Some(vec![]),
            ..test_chat_response()
        };

        assert_eq!(contexts_of(&[without]), vec![Vec::<String>::new()]);
        assert_eq!(contexts_of(&[empty]), vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_citations_without_snippet_are_skipped() {
        let response = ChatResponse {
            source_attributions: Some(vec![
                SourceAttribution {
                    snippet: Some("first".to_string()),
                    ..SourceAttribution::default()
                },
                SourceAttribution::default(),
                SourceAttribution {
                    snippet: Some(String::new()),
                    ..SourceAttribution::default()
                },
                SourceAttribution {
                    snippet: Some("second".to_string()),
                    ..SourceAttribution::default()
                },
            ]),
            ..ChatResponse::default()
        };

        assert_eq!(extract_contexts(&response), vec!["first", "second"]);
    }

    #[test]
    fn test_shaping_is_idempotent() {
        let response = test_chat_response();
        assert_eq!(extract_contexts(&response), extract_contexts(&response));
        assert_eq!(extract_answer(&response), extract_answer(&response));
        assert_eq!(extract_answer(&response).as_deref(), Some("test message"));
    }

    #[test]
    fn test_dataset_follows_testset_order() {
        let testset = TestSet::new(vec![
            TestCase {
                question: "what is Q?".to_string(),
                ground_truth: "an assistant".to_string(),
            },
            TestCase {
                question: "unanswered".to_string(),
                ground_truth: "n/a".to_string(),
            },
        ])
        .unwrap();
        let responses = HashMap::from([("what is Q?".to_string(), test_chat_response())]);

        let dataset = shape_dataset(&testset, &responses);

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[0].answer, "test message");
        assert_eq!(dataset.rows[0].ground_truth, "an assistant");
        assert_eq!(dataset.rows[0].contexts, vec!["data snippet"]);
        assert_eq!(dataset.rows[1].answer, "");
        assert!(dataset.rows[1].contexts.is_empty());
        assert_eq!(shape_dataset(&testset, &responses), dataset);
    }
}
