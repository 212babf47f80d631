use serde::{Deserialize, Serialize};

use super::records::{AssessmentId, UserId};

/// Maximum attempts a learner may currently make on an assessment.
/// `permitted_attempts` never decreases for a given pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideAllowance {
    pub assessment_id: AssessmentId,
    pub learner_id: UserId,
    pub permitted_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AllowanceChange {
    Created { permitted: u32 },
    Raised { from: u32, to: u32 },
    /// The existing allowance already covers the requested count.
    Unchanged { permitted: u32 },
}
