//! Handing a finished reply to the knowledge store.
//!
//! Submitting needs an authenticated Cofacts session, which factdesk does
//! not manage. [`UnauthenticatedSubmitter`] stands in for a real submitter
//! and reports what would have been sent.

use serde::Serialize;

use crate::draft::Draft;
use crate::knowledge::ReplyType;
use crate::tools::{ToolFailure, ToolOutcome};

/// The reply as the knowledge store's `CreateReply` mutation takes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySubmission {
    pub article_id: String,
    #[serde(rename = "type")]
    pub reply_type: ReplyType,
    pub text: String,
    pub reference: String,
}

impl ReplySubmission {
    pub fn new(article_id: &str, draft: &Draft) -> Self {
        Self {
            article_id: article_id.to_string(),
            reply_type: draft.classification().reply_type(),
            text: draft.text().to_string(),
            reference: draft.reference_field(),
        }
    }
}

/// What a submitter did with a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitReceipt {
    Submitted { reply_id: String },
    /// Nothing was sent.
    NotSubmitted {
        reason: String,
        article_id: String,
        reply_type: ReplyType,
        text_length: usize,
        reference_length: usize,
    },
}

pub trait ReplySubmitter: Send + Sync {
    fn submit(&self, submission: &ReplySubmission) -> ToolOutcome<SubmitReceipt>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnauthenticatedSubmitter;

impl ReplySubmitter for UnauthenticatedSubmitter {
    fn submit(&self, submission: &ReplySubmission) -> ToolOutcome<SubmitReceipt> {
        if submission.article_id.trim().is_empty() {
            return Err(ToolFailure::malformed("submit", "reply has no article to attach to"));
        }
        tracing::info!(article = %submission.article_id, reply_type = %submission.reply_type, "reply not submitted: no credentials");
        Ok(SubmitReceipt::NotSubmitted {
            reason: "reply submission requires an authenticated Cofacts session".into(),
            article_id: submission.article_id.clone(),
            reply_type: submission.reply_type,
            text_length: submission.text.chars().count(),
            reference_length: submission.reference.chars().count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Case, CaseId, Provenance};
    use crate::draft::Classification;

    fn draft() -> Draft {
        let mut case = Case::new(CaseId::article("a1"), Some("a1".into()), "msg");
        case.trace_url("https://gov.example/subsidy");
        let id = case
            .record_evidence("https://gov.example/subsidy", "Subsidy page", None, Provenance::SearchResult, 1.0)
            .unwrap();
        Draft::builder(Classification::Misinformation)
            .text("⚠️ The amount is wrong.")
            .reference("https://gov.example/subsidy", "States NT$10,000")
            .justified_by(id)
            .build(case.evidence())
            .unwrap()
    }

    #[test]
    fn submission_uses_the_knowledge_store_shape() {
        let submission = ReplySubmission::new("a1", &draft());
        assert_eq!(submission.reply_type, ReplyType::Rumor);
        assert_eq!(submission.reference, "https://gov.example/subsidy\nStates NT$10,000");
        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(json["type"], "RUMOR");
        assert_eq!(json["articleId"], "a1");
    }

    #[test]
    fn placeholder_reports_instead_of_sending() {
        let receipt = UnauthenticatedSubmitter
            .submit(&ReplySubmission::new("a1", &draft()))
            .unwrap();
        let SubmitReceipt::NotSubmitted { text_length, .. } = receipt else {
            panic!("nothing may be submitted without credentials");
        };
        assert_eq!(text_length, "⚠️ The amount is wrong.".chars().count());
        assert!(UnauthenticatedSubmitter
            .submit(&ReplySubmission::new(" ", &draft()))
            .is_err());
    }
}
