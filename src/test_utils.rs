//! Shared test utilities: fixtures, mock interpreters and proptest generators.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};

use crate::analysis::{AnalysisBackend, AnalysisError, AnalysisErrorKind};
use crate::bitbucket::HostApiError;
use crate::effects::{HostEffect, HostInterpreter, HostResponse};
use crate::types::{CommitHash, PrId, PullRequestEvent};

pub const TEST_REPOSITORY: &str = "team/site";

pub fn arb_pr_id() -> impl Strategy<Value = PrId> {
    any::<u64>().prop_map(PrId)
}

pub fn arb_commit_hash() -> impl Strategy<Value = CommitHash> {
    "[0-9a-f]{12,40}".prop_map(|s| CommitHash::parse(s).unwrap())
}

fn api_base(pr: u64) -> String {
    format!(
        "https://api.bitbucket.org/2.0/repositories/{}/pullrequests/{}",
        TEST_REPOSITORY, pr
    )
}

/// An open pull request event for `pr` at commit `hash`.
pub fn sample_event(pr: u64, hash: &str) -> PullRequestEvent {
    PullRequestEvent {
        repository: Some(TEST_REPOSITORY.to_string()),
        pr: PrId(pr),
        title: format!("Test PR {}", pr),
        state: "OPEN".to_string(),
        diff_url: format!("{}/diff", api_base(pr)),
        comments_url: format!("{}/comments", api_base(pr)),
        commit: CommitHash::parse(hash).unwrap(),
        updated_on: Utc.with_ymd_and_hms(2025, 7, 22, 14, 30, 0).single(),
    }
}

/// A Bitbucket `pullrequest:*` webhook body.
pub fn sample_payload(pr: u64, hash: &str, state: &str) -> Value {
    json!({
        "pullrequest": {
            "id": pr,
            "title": format!("Test PR {}", pr),
            "state": state,
            "updated_on": "2025-07-22T14:30:00.000000+00:00",
            "source": { "commit": { "hash": hash } },
            "links": {
                "diff": { "href": format!("{}/diff", api_base(pr)) },
                "comments": { "href": format!("{}/comments", api_base(pr)) }
            }
        },
        "repository": { "full_name": TEST_REPOSITORY }
    })
}

// ─── Mock Host ────────────────────────────────────────────────────────────────

/// Records every effect and answers from a fixed configuration.
#[derive(Debug)]
pub struct MockHost {
    diff: Result<String, u16>,
    publish_failure: Option<u16>,
    effects: Mutex<Vec<HostEffect>>,
}

impl MockHost {
    pub fn with_diff(diff: &str) -> Self {
        Self {
            diff: Ok(diff.to_string()),
            publish_failure: None,
            effects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_fetch(status: u16) -> Self {
        Self {
            diff: Err(status),
            publish_failure: None,
            effects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_publish(mut self, status: u16) -> Self {
        self.publish_failure = Some(status);
        self
    }

    pub fn effects(&self) -> Vec<HostEffect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.effects()
            .iter()
            .filter(|e| matches!(e, HostEffect::FetchDiff { .. }))
            .count()
    }

    pub fn comments(&self) -> Vec<String> {
        self.effects()
            .into_iter()
            .filter_map(|e| match e {
                HostEffect::PostComment { body, .. } => Some(body),
                HostEffect::FetchDiff { .. } => None,
            })
            .collect()
    }
}

impl HostInterpreter for MockHost {
    type Error = HostApiError;

    async fn interpret(&self, effect: HostEffect) -> Result<HostResponse, Self::Error> {
        self.effects.lock().unwrap().push(effect.clone());
        match effect {
            HostEffect::FetchDiff { .. } => match &self.diff {
                Ok(diff) => Ok(HostResponse::Diff(diff.clone())),
                Err(status) => Err(HostApiError::with_status(*status, "mock fetch failure")),
            },
            HostEffect::PostComment { .. } => match self.publish_failure {
                Some(status) => Err(HostApiError::with_status(status, "mock publish failure")),
                None => Ok(HostResponse::Posted),
            },
        }
    }
}

// ─── Scripted Analysis Backend ────────────────────────────────────────────────

type Scripted = Result<Option<String>, AnalysisError>;

/// Returns scripted responses in order, then the fallback (or a fixed review).
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<fn() -> Scripted>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn repeating(response: fn() -> Scripted) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl AnalysisBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = self.script.lock().unwrap().pop_front();
        match (next, self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => fallback(),
            (None, None) => Ok(Some("Looks good.".to_string())),
        }
    }
}

/// A transient error, for retry tests.
pub fn transient_error() -> AnalysisError {
    AnalysisError::new(AnalysisErrorKind::Connect, "connection refused")
}
