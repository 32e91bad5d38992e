//! Intervention suggestions
//!
//! A fixed rule table from (risk category, dominant factor domain) to
//! intervention categories. Creating and tracking interventions belongs to
//! the host application.

use crate::explain::Explanation;
use crate::features::FactorDomain;
use crate::models::{RiskCategory, RiskResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionCategory {
    AcademicSupport,
    Tutoring,
    CreditRecovery,
    AttendanceOutreach,
    FamilyEngagement,
    Mentoring,
    EngagementCheckIn,
    BehavioralSupport,
    Counseling,
    ProgressMonitoring,
    DataReview,
}

impl InterventionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionCategory::AcademicSupport => "academic_support",
            InterventionCategory::Tutoring => "tutoring",
            InterventionCategory::CreditRecovery => "credit_recovery",
            InterventionCategory::AttendanceOutreach => "attendance_outreach",
            InterventionCategory::FamilyEngagement => "family_engagement",
            InterventionCategory::Mentoring => "mentoring",
            InterventionCategory::EngagementCheckIn => "engagement_check_in",
            InterventionCategory::BehavioralSupport => "behavioral_support",
            InterventionCategory::Counseling => "counseling",
            InterventionCategory::ProgressMonitoring => "progress_monitoring",
            InterventionCategory::DataReview => "data_review",
        }
    }
}

impl fmt::Display for InterventionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use InterventionCategory::*;

/// Actions for the dominant domain, most urgent first
fn domain_actions(category: RiskCategory, domain: FactorDomain) -> &'static [InterventionCategory] {
    match (category, domain) {
        (RiskCategory::High, FactorDomain::Academic) => &[AcademicSupport, Tutoring, FamilyEngagement],
        (RiskCategory::High, FactorDomain::Attendance) => &[AttendanceOutreach, FamilyEngagement, Mentoring],
        (RiskCategory::High, FactorDomain::Engagement) => &[EngagementCheckIn, AcademicSupport, Mentoring],
        (RiskCategory::High, FactorDomain::Behavior) => &[BehavioralSupport, Counseling, FamilyEngagement],
        (RiskCategory::High, FactorDomain::Background) => &[Counseling, FamilyEngagement],
        (RiskCategory::Moderate, FactorDomain::Academic) => &[AcademicSupport, Tutoring],
        (RiskCategory::Moderate, FactorDomain::Attendance) => &[AttendanceOutreach],
        (RiskCategory::Moderate, FactorDomain::Engagement) => &[EngagementCheckIn],
        (RiskCategory::Moderate, FactorDomain::Behavior) => &[BehavioralSupport],
        (RiskCategory::Moderate, FactorDomain::Background) => &[Mentoring],
        (RiskCategory::Low, _) => &[],
    }
}

/// First-line action when a domain is a secondary concern
fn primary_action(domain: FactorDomain) -> InterventionCategory {
    match domain {
        FactorDomain::Academic => AcademicSupport,
        FactorDomain::Attendance => AttendanceOutreach,
        FactorDomain::Engagement => EngagementCheckIn,
        FactorDomain::Behavior => BehavioralSupport,
        FactorDomain::Background => Counseling,
    }
}

/// Stateless rule lookup from a result and its explanation to interventions
#[derive(Debug, Clone, Copy, Default)]
pub struct InterventionAdvisor;

impl InterventionAdvisor {
    pub fn new() -> Self {
        Self
    }

    /// Suggested categories, de-duplicated, in priority order
    pub fn suggest(&self, result: &RiskResult, explanation: &Explanation) -> Vec<InterventionCategory> {
        let mut actions = Vec::new();

        match (result.risk_category, explanation.dominant_domain()) {
            (RiskCategory::High, None) => actions.extend([AcademicSupport, Counseling, FamilyEngagement]),
            (category, Some(domain)) => actions.extend_from_slice(domain_actions(category, domain)),
            (_, None) => {}
        }

        if result.risk_category == RiskCategory::High {
            if explanation
                .risk_factors
                .iter()
                .any(|f| f.feature == "course_failures")
            {
                actions.push(CreditRecovery);
            }
            actions.extend(explanation.risk_factors.iter().skip(1).map(|f| primary_action(f.domain)));
        }

        actions.push(ProgressMonitoring);
        if result.source.is_fallback() {
            actions.push(DataReview);
        }

        let mut seen = Vec::with_capacity(actions.len());
        for action in actions {
            if !seen.contains(&action) {
                seen.push(action);
            }
        }
        seen
    }
}
