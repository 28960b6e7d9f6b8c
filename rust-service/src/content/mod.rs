//! Newsletter issue payloads and the content source contract.
//!
//! One issue is a JSON document: title, topic list, estimated read time,
//! and an ordered list of question items. Question kinds are tagged;
//! unrecognized kinds deserialize into [`Question::Unknown`] and render as
//! nothing rather than failing the issue.

pub mod drive;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Completion marker appended to a payload's annotation once its dispatch
/// attempt has been made. Matched as a substring against both the file
/// name and the annotation.
pub const DONE_MARKER: &str = "\u{2705}done";

/// One newsletter issue's structured content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPayload {
    pub title: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub read_time: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// A question item, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Question {
    #[serde(rename = "coding")]
    Coding(CodingQuestion),
    #[serde(rename = "interview_flow")]
    InterviewFlow(InterviewFlowQuestion),
    /// Unsupported kind; skipped by the renderer
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingQuestion {
    pub title: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub solution: Option<Solution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub code: String,
    #[serde(default)]
    pub time_complexity: String,
    #[serde(default)]
    pub space_complexity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewFlowQuestion {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub message: String,
}

/// A pending issue as discovered in the content store: the parsed payload
/// plus the source-file identity needed to mark it done later.
#[derive(Debug, Clone)]
pub struct PendingIssue {
    /// Store-side file identifier
    pub file_id: String,
    /// Human-readable file name
    pub name: String,
    /// Free-text annotation currently on the file
    pub annotation: String,
    pub payload: ContentPayload,
}

/// Discovery and completion-marking of newsletter issues.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Locate the earliest unprocessed issue, or `None` when everything in
    /// the folder already carries the completion marker. `None` is a
    /// normal outcome, not an error.
    async fn fetch_next_pending(&self) -> Result<Option<PendingIssue>>;

    /// Append the completion marker to the issue's annotation, preserving
    /// whatever annotation text was already there. Must only be called
    /// after the dispatch attempt for the issue has been made.
    async fn mark_done(&self, issue: &PendingIssue) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_deserialization() {
        let json = r#"{
            "title": "Issue 12",
            "topics": ["arrays", "two pointers"],
            "read_time": "6 min read",
            "questions": [
                {
                    "type": "coding",
                    "title": "Two Sum",
                    "difficulty": "Easy",
                    "tags": ["array"],
                    "description": "Find two numbers adding to target.",
                    "examples": [
                        {"input": "[2,7]", "output": "[0,1]", "explanation": "2+7=9"}
                    ],
                    "solution": {
                        "code": "def two_sum(nums, target): ...",
                        "time_complexity": "O(n)",
                        "space_complexity": "O(n)"
                    }
                },
                {
                    "type": "interview_flow",
                    "title": "Design a cache",
                    "tags": ["system design"],
                    "description": "Walkthrough.",
                    "dialogue": [
                        {"speaker": "Interviewer", "message": "Where do we start?"}
                    ]
                }
            ]
        }"#;

        let payload: ContentPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.title, "Issue 12");
        assert_eq!(payload.questions.len(), 2);
        assert!(matches!(payload.questions[0], Question::Coding(_)));
        assert!(matches!(payload.questions[1], Question::InterviewFlow(_)));
    }

    #[test]
    fn test_unknown_question_kind_is_tolerated() {
        let json = r#"{
            "title": "Issue 13",
            "questions": [{"type": "quiz", "title": "?"}]
        }"#;

        let payload: ContentPayload = serde_json::from_str(json).unwrap();
        assert!(matches!(payload.questions[0], Question::Unknown));
    }

    #[test]
    fn test_solution_is_optional() {
        let json = r#"{
            "title": "Issue 14",
            "questions": [{
                "type": "coding",
                "title": "No solution yet",
                "difficulty": "Hard"
            }]
        }"#;

        let payload: ContentPayload = serde_json::from_str(json).unwrap();
        match &payload.questions[0] {
            Question::Coding(q) => assert!(q.solution.is_none()),
            _ => panic!("Expected coding question"),
        }
    }
}
