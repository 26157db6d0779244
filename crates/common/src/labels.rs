use std::{collections::BTreeSet, fs, path::Path};

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generated questions for one paper, as written by the question-generation step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LabeledQuestions {
    pub document_id: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LabeledPair {
    pub document_id: String,
    pub question: String,
}

impl LabeledQuestions {
    pub fn load_all(path: &Path) -> Result<Vec<Self>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading labeled questions: {}", path.display()))?;
        serde_json::from_str::<Vec<Self>>(&raw)
            .with_context(|| format!("failed parsing labeled questions: {}", path.display()))
    }
}

pub fn flatten_labels(labels: &[LabeledQuestions]) -> Vec<LabeledPair> {
    labels
        .iter()
        .flat_map(|row| {
            row.questions
                .iter()
                .map(String::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(|question| LabeledPair {
                    document_id: row.document_id.clone(),
                    question: question.to_string(),
                })
        })
        .collect()
}

/// Drops pairs whose document is not present in the store.
pub fn restrict_to_documents(pairs: Vec<LabeledPair>, present: &BTreeSet<String>) -> Vec<LabeledPair> {
    pairs
        .into_iter()
        .filter(|pair| present.contains(&pair.document_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{LabeledQuestions, flatten_labels, restrict_to_documents};

    fn labels() -> Vec<LabeledQuestions> {
        vec![
            LabeledQuestions {
                document_id: "2101.00001".to_string(),
                questions: vec![
                    "How are derivatives priced?".to_string(),
                    "  ".to_string(),
                    "What is implied volatility?".to_string(),
                ],
            },
            LabeledQuestions {
                document_id: "2101.00002".to_string(),
                questions: vec!["What are risk parity portfolios?".to_string()],
            },
        ]
    }

    #[test]
    fn flatten_skips_blank_questions_and_keeps_order() {
        let pairs = flatten_labels(&labels());
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].document_id, "2101.00001");
        assert_eq!(pairs[1].question, "What is implied volatility?");
        assert_eq!(pairs[2].document_id, "2101.00002");
    }

    #[test]
    fn flatten_trims_surrounding_whitespace() {
        let pairs = flatten_labels(&[LabeledQuestions {
            document_id: "2101.00003".to_string(),
            questions: vec!["  What is carry?\n".to_string()],
        }]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "What is carry?");
    }

    #[test]
    fn restriction_keeps_only_present_documents() {
        let present = BTreeSet::from(["2101.00002".to_string()]);
        let pairs = restrict_to_documents(flatten_labels(&labels()), &present);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "What are risk parity portfolios?");
    }

    #[test]
    fn load_all_reads_json_file() {
        let path = std::env::temp_dir().join(format!("ragxiv-labels-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"document_id":"d1","questions":["q1","q2"]}]"#,
        )
        .expect("write");
        let loaded = LabeledQuestions::load_all(&path).expect("load");
        assert_eq!(loaded[0].questions.len(), 2);
    }
}
