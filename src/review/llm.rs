//! Model-backed reviewer driven by a viewpoint profile.

use std::sync::Arc;

use serde::Deserialize;

use crate::draft::Draft;
use crate::llm::{LanguageModel, parse_json_reply};
use crate::tools::{ToolFailure, ToolOutcome};

use super::{Critique, ReReview, Reviewer, ViewpointProfile, merge_questions};

#[derive(Debug, Deserialize)]
struct CritiqueReply {
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    reactions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResolvedReply {
    /// 1-based indices into the numbered prior questions.
    resolved: Vec<usize>,
}

/// A [`Reviewer`] that asks a language model to speak for a profile.
///
/// Critiques always start with the profile's focus questions, so two
/// critiques of the same message share that core whatever the model adds.
/// A model that is down or answers off-format fails the call.
/// Re-reviews ask the model only for the indices it considers answered and
/// derive the partition from them.
pub struct ProfileReviewer {
    profile: ViewpointProfile,
    llm: Arc<dyn LanguageModel>,
}

impl ProfileReviewer {
    pub fn new(profile: ViewpointProfile, llm: Arc<dyn LanguageModel>) -> Self {
        Self { profile, llm }
    }

    fn tool(&self) -> String {
        format!("reviewer:{}", self.profile.id)
    }
}

impl Reviewer for ProfileReviewer {
    fn profile(&self) -> &ViewpointProfile {
        &self.profile
    }

    fn critique(&self, message: &str) -> ToolOutcome<Critique> {
        let prompt = format!(
            "A suspicious message is circulating:\n\n{message}\n\n\
             List the critical questions your audience would ask about it, and how they would \
             react to it. Respond with JSON: {{\"questions\": [string], \"reactions\": [string]}}"
        );
        let reply: CritiqueReply = self
            .llm
            .generate(&prompt, Some(&self.profile.persona()))
            .map_err(|e| ToolFailure::unavailable(&self.tool(), e.to_string()))
            .and_then(|r| {
                parse_json_reply(&r).map_err(|e| ToolFailure::malformed(&self.tool(), e.to_string()))
            })?;

        Ok(Critique {
            reviewer: self.profile.id.clone(),
            questions: merge_questions([
                self.profile.focus_questions.as_slice(),
                reply.questions.as_slice(),
            ]),
            reactions: reply
                .reactions
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        })
    }

    fn re_review(&self, message: &str, draft: &Draft, prior: &[String]) -> ToolOutcome<ReReview> {
        if prior.is_empty() {
            return Ok(ReReview {
                reviewer: self.profile.id.clone(),
                resolved: Vec::new(),
                unresolved: Vec::new(),
            });
        }

        let numbered: String = prior
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}\n", i + 1, q))
            .collect();
        let prompt = format!(
            "Message:\n{message}\n\nProposed fact-check reply ({}):\n{}\n\nReferences:\n{}\n\n\
             Your earlier questions:\n{numbered}\n\
             Which of these questions does the reply answer well enough for your audience? \
             Respond with JSON: {{\"resolved\": [question numbers]}}",
            draft.classification(),
            draft.text(),
            draft.reference_field(),
        );
        let reply: ResolvedReply = self
            .llm
            .generate(&prompt, Some(&self.profile.persona()))
            .map_err(|e| ToolFailure::unavailable(&self.tool(), e.to_string()))
            .and_then(|r| {
                parse_json_reply(&r).map_err(|e| ToolFailure::malformed(&self.tool(), e.to_string()))
            })?;

        let (resolved, unresolved) = partition_by_index(prior, &reply.resolved);
        Ok(ReReview {
            reviewer: self.profile.id.clone(),
            resolved,
            unresolved,
        })
    }
}

/// Split `prior` by 1-based indices; out-of-range indices are ignored.
fn partition_by_index(prior: &[String], resolved: &[usize]) -> (Vec<String>, Vec<String>) {
    prior
        .iter()
        .enumerate()
        .map(|(i, q)| (resolved.contains(&(i + 1)), q.clone()))
        .fold((Vec::new(), Vec::new()), |(mut yes, mut no), (hit, q)| {
            if hit {
                yes.push(q);
            } else {
                no.push(q);
            }
            (yes, no)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Case, CaseId};
    use crate::draft::Classification;
    use crate::llm::{LlmError, LlmResult};
    use crate::review::check_partition;
    use crate::review::profile::ViewpointRegistry;

    struct FixedModel(Option<&'static str>);

    impl LanguageModel for FixedModel {
        fn generate(&self, _prompt: &str, _system: Option<&str>) -> LlmResult<String> {
            self.0.map(str::to_string).ok_or(LlmError::RequestFailed {
                message: "down".into(),
            })
        }
    }

    fn reviewer(reply: Option<&'static str>) -> ProfileReviewer {
        let profile = ViewpointRegistry::bundled().get("centrist").cloned().unwrap();
        ProfileReviewer::new(profile, Arc::new(FixedModel(reply)))
    }

    fn draft() -> Draft {
        let case = Case::new(CaseId::adhoc("m"), None, "m");
        Draft::builder(Classification::Misinformation)
            .text("The subsidy is NT$10,000.")
            .build(case.evidence())
            .unwrap()
    }

    #[test]
    fn critique_keeps_focus_questions_first() {
        let r = reviewer(Some(r#"{"questions": ["Who announced this?"], "reactions": ["Doubt"]}"#));
        let critique = r.critique("Everyone gets NT$20,000!").unwrap();
        let focus = &r.profile().focus_questions;
        assert_eq!(&critique.questions[..focus.len()], focus.as_slice());
        assert_eq!(critique.questions.last().unwrap(), "Who announced this?");
        assert_eq!(critique.reactions, vec!["Doubt"]);
    }

    #[test]
    fn critique_core_is_stable() {
        let r = reviewer(Some(r#"{"questions": ["Who announced this?"]}"#));
        let first = r.critique("Everyone gets NT$20,000!").unwrap();
        let second = r.critique("Everyone gets NT$20,000!").unwrap();
        assert_eq!(first, second);
        assert!(first.reactions.is_empty());
    }

    #[test]
    fn critique_reports_a_model_outage() {
        assert!(matches!(
            reviewer(None).critique("Everyone gets NT$20,000!"),
            Err(ToolFailure::Unavailable { ref tool, .. }) if tool == "reviewer:centrist"
        ));
        assert!(matches!(
            reviewer(Some("I would rather not say.")).critique("Everyone gets NT$20,000!"),
            Err(ToolFailure::Malformed { .. })
        ));
    }

    #[test]
    fn re_review_partitions_by_index() {
        let r = reviewer(Some(r#"{"resolved": [2, 9]}"#));
        let prior: Vec<String> = vec!["A?".into(), "B?".into(), "C?".into()];
        let result = r.re_review("msg", &draft(), &prior).unwrap();
        assert_eq!(result.resolved, vec!["B?"]);
        assert_eq!(result.unresolved, vec!["A?", "C?"]);
        assert!(check_partition(&prior, &result).is_ok());
    }

    #[test]
    fn re_review_failure_is_explicit() {
        let r = reviewer(None);
        let prior: Vec<String> = vec!["A?".into()];
        assert!(matches!(
            r.re_review("msg", &draft(), &prior),
            Err(ToolFailure::Unavailable { .. })
        ));
        assert!(r.re_review("msg", &draft(), &[]).unwrap().resolved.is_empty());
    }
}
