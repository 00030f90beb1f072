use std::fmt;

use serde::{Deserialize, Serialize};

/// The three ordered stages of a compliance run.
///
/// Each run flows through: DAM_ANALYSIS → JOB_AID_ASSESSMENT → FINDINGS_TRANSMISSION.
/// Declaration order is the execution order, so the derived `Ord` is the
/// total order used for sequencing and resume checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    Step1,
    Step2,
    Step3,
}

impl Step {
    /// Every step, in execution order.
    pub const ALL: [Step; 3] = [Step::Step1, Step::Step2, Step::Step3];

    /// The final step; a run is complete once it has been recorded.
    pub const LAST: Step = Step::Step3;

    /// Zero-based position in the execution order.
    pub fn index(self) -> usize {
        match self {
            Step::Step1 => 0,
            Step::Step2 => 1,
            Step::Step3 => 2,
        }
    }

    /// One-based step number, as shown to users.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<Step> {
        match n {
            1 => Some(Step::Step1),
            2 => Some(Step::Step2),
            3 => Some(Step::Step3),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Step> {
        match self {
            Step::Step1 => Some(Step::Step2),
            Step::Step2 => Some(Step::Step3),
            Step::Step3 => None,
        }
    }

    pub fn previous(self) -> Option<Step> {
        match self {
            Step::Step1 => None,
            Step::Step2 => Some(Step::Step1),
            Step::Step3 => Some(Step::Step2),
        }
    }

    /// This step and every step after it, in order.
    pub fn remaining(self) -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().skip(self.index())
    }

    /// Human-readable stage title.
    pub fn title(self) -> &'static str {
        match self {
            Step::Step1 => "DAM Analysis",
            Step::Step2 => "Job Aid Assessment",
            Step::Step3 => "Findings Transmission",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Step1 => write!(f, "STEP1_DAM_ANALYSIS"),
            Step::Step2 => write!(f, "STEP2_JOB_AID_ASSESSMENT"),
            Step::Step3 => write!(f, "STEP3_FINDINGS_TRANSMISSION"),
        }
    }
}
