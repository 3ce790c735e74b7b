//! Fan-out of one review round across every reviewer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::draft::Draft;
use crate::tools::run_with_deadline;

use super::{Reviewer, ReviewerVerdict, check_partition, merge_questions};

/// The reviewers consulted for a case.
///
/// Calls of one round run in parallel, each under its own deadline; the
/// round returns once every reviewer has answered or timed out. Verdicts
/// come back in reviewer order regardless of completion order.
#[derive(Clone)]
pub struct ReviewPanel {
    reviewers: Vec<Arc<dyn Reviewer>>,
    timeout: Duration,
}

impl ReviewPanel {
    pub fn new(reviewers: Vec<Arc<dyn Reviewer>>, timeout: Duration) -> Self {
        Self { reviewers, timeout }
    }

    pub fn len(&self) -> usize {
        self.reviewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviewers.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.reviewers.iter().map(|r| r.profile().id.clone()).collect()
    }

    /// Round-1 critiques of the raw message, for the reviewers in `only`
    /// (every reviewer when `None`).
    ///
    /// Questions are deduplicated before they are recorded, so later
    /// re-reviews partition a set.
    pub fn critique_all(
        &self,
        message: &str,
        only: Option<&[String]>,
        round: u32,
        cancel: &CancelToken,
    ) -> Vec<ReviewerVerdict> {
        self.reviewers
            .par_iter()
            .filter(|r| only.is_none_or(|ids| ids.contains(&r.profile().id)))
            .map(|reviewer| {
                let id = reviewer.profile().id.clone();
                let worker = Arc::clone(reviewer);
                let message = message.to_string();
                let outcome = run_with_deadline(&format!("reviewer:{id}"), self.timeout, cancel, move || {
                    worker.critique(&message)
                });
                match outcome {
                    Ok(critique) => ReviewerVerdict::Critique {
                        reviewer: id,
                        round,
                        questions: merge_questions([critique.questions.as_slice()]),
                        reactions: critique.reactions,
                    },
                    Err(failure) => {
                        tracing::warn!(reviewer = %id, round, %failure, "critique failed");
                        ReviewerVerdict::Failed {
                            reviewer: id,
                            round,
                            reason: failure.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    /// Re-review `draft` against each reviewer's open questions.
    ///
    /// Reviewers with nothing open are skipped. A result that does not
    /// partition the open questions is recorded as a failure, which leaves
    /// every one of them open.
    pub fn re_review_all(
        &self,
        message: &str,
        draft: &Draft,
        open: &BTreeMap<String, Vec<String>>,
        round: u32,
        cancel: &CancelToken,
    ) -> Vec<ReviewerVerdict> {
        self.reviewers
            .par_iter()
            .filter_map(|reviewer| {
                let id = reviewer.profile().id.clone();
                let prior = open.get(&id).filter(|q| !q.is_empty())?.clone();
                let worker = Arc::clone(reviewer);
                let (message, draft, questions) = (message.to_string(), draft.clone(), prior.clone());
                let outcome = run_with_deadline(&format!("reviewer:{id}"), self.timeout, cancel, move || {
                    worker.re_review(&message, &draft, &questions)
                });

                let failed = |reason: String| {
                    tracing::warn!(reviewer = %id, round, %reason, "re-review failed");
                    ReviewerVerdict::Failed {
                        reviewer: id.clone(),
                        round,
                        reason,
                    }
                };
                Some(match outcome {
                    Ok(result) => match check_partition(&prior, &result) {
                        Ok(()) => ReviewerVerdict::ReReview {
                            reviewer: id.clone(),
                            round,
                            resolved: result.resolved,
                            unresolved: result.unresolved,
                        },
                        Err(violation) => failed(violation.to_string()),
                    },
                    Err(failure) => failed(failure.to_string()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Case, CaseId};
    use crate::draft::Classification;
    use crate::review::{Critique, ReReview, ViewpointProfile};
    use crate::tools::{ToolFailure, ToolOutcome};

    struct Scripted {
        profile: ViewpointProfile,
        delay: Duration,
        overlap: bool,
        asked: Vec<String>,
    }

    impl Scripted {
        fn new(id: &str, delay_ms: u64, overlap: bool) -> Arc<dyn Reviewer> {
            Self::asking(id, delay_ms, overlap, vec![format!("{id} question?")])
        }

        fn asking(id: &str, delay_ms: u64, overlap: bool, asked: Vec<String>) -> Arc<dyn Reviewer> {
            Arc::new(Self {
                profile: ViewpointProfile {
                    id: id.into(),
                    name: id.into(),
                    constituency: "test".into(),
                    values: vec![],
                    focus_questions: vec![format!("{id} question?")],
                },
                delay: Duration::from_millis(delay_ms),
                overlap,
                asked,
            })
        }
    }

    impl Reviewer for Scripted {
        fn profile(&self) -> &ViewpointProfile {
            &self.profile
        }

        fn critique(&self, _message: &str) -> ToolOutcome<Critique> {
            std::thread::sleep(self.delay);
            Ok(Critique {
                reviewer: self.profile.id.clone(),
                questions: self.asked.clone(),
                reactions: vec![],
            })
        }

        fn re_review(&self, _message: &str, _draft: &Draft, prior: &[String]) -> ToolOutcome<ReReview> {
            std::thread::sleep(self.delay);
            if self.profile.id == "broken" {
                return Err(ToolFailure::unavailable("reviewer:broken", "down"));
            }
            Ok(ReReview {
                reviewer: self.profile.id.clone(),
                resolved: prior.to_vec(),
                unresolved: if self.overlap { prior.to_vec() } else { vec![] },
            })
        }
    }

    fn draft() -> Draft {
        let case = Case::new(CaseId::adhoc("m"), None, "m");
        Draft::builder(Classification::TrueInfo)
            .text("Accurate.")
            .build(case.evidence())
            .unwrap()
    }

    #[test]
    fn slow_reviewer_times_out_without_blocking_the_round() {
        let panel = ReviewPanel::new(
            vec![Scripted::new("fast", 0, false), Scripted::new("slow", 2_000, false)],
            Duration::from_millis(200),
        );
        let verdicts = panel.critique_all("msg", None, 1, &CancelToken::new());
        assert_eq!(verdicts.len(), 2);
        assert!(matches!(&verdicts[0], ReviewerVerdict::Critique { reviewer, .. } if reviewer == "fast"));
        assert!(matches!(&verdicts[1], ReviewerVerdict::Failed { reviewer, .. } if reviewer == "slow"));
    }

    #[test]
    fn overlapping_partition_is_recorded_as_failure() {
        let panel = ReviewPanel::new(
            vec![
                Scripted::new("honest", 0, false),
                Scripted::new("sloppy", 0, true),
                Scripted::new("broken", 0, false),
                Scripted::new("idle", 0, false),
            ],
            Duration::from_secs(1),
        );
        let mut open = BTreeMap::new();
        for id in ["honest", "sloppy", "broken"] {
            open.insert(id.to_string(), vec![format!("{id} question?")]);
        }
        let verdicts = panel.re_review_all("msg", &draft(), &open, 2, &CancelToken::new());
        assert_eq!(verdicts.len(), 3, "reviewers with nothing open are skipped");
        assert!(matches!(&verdicts[0], ReviewerVerdict::ReReview { .. }));
        assert!(matches!(&verdicts[1], ReviewerVerdict::Failed { .. }));
        assert!(matches!(&verdicts[2], ReviewerVerdict::Failed { .. }));
    }

    #[test]
    fn critique_can_target_a_subset() {
        let panel = ReviewPanel::new(
            vec![Scripted::new("a", 0, false), Scripted::new("b", 0, false)],
            Duration::from_secs(1),
        );
        let only = vec!["b".to_string()];
        let verdicts = panel.critique_all("msg", Some(&only), 1, &CancelToken::new());
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].reviewer(), "b");
    }

    #[test]
    fn repeated_questions_are_recorded_once() {
        let asked = vec!["A?".to_string(), "A?".to_string(), " A? ".to_string(), "B?".to_string()];
        let panel = ReviewPanel::new(vec![Scripted::asking("d", 0, false, asked)], Duration::from_secs(1));
        let cancel = CancelToken::new();

        let critiques = panel.critique_all("msg", None, 1, &cancel);
        let ReviewerVerdict::Critique { questions, .. } = &critiques[0] else {
            panic!("critique should succeed: {:?}", critiques[0]);
        };
        assert_eq!(questions, &vec!["A?".to_string(), "B?".to_string()]);

        let open = crate::review::open_questions(&critiques);
        let verdicts = panel.re_review_all("msg", &draft(), &open, 2, &cancel);
        assert!(
            matches!(&verdicts[0], ReviewerVerdict::ReReview { resolved, unresolved, .. }
                if resolved.len() == 2 && unresolved.is_empty()),
            "{:?}",
            verdicts[0]
        );
    }
}
