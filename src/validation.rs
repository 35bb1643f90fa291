//! Request payload validation.
//!
//! Field bounds mirror the public form contract: failures surface as HTTP
//! 400 with one message per offending field.

use crate::errors::AppError;
use crate::models::{LeadSubmission, LeadUpdateRequest, LoginRequest};
use regex::Regex;
use std::sync::OnceLock;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 255;
pub const COMPANY_MAX_LEN: usize = 255;
pub const PROBLEM_TEXT_MIN_LEN: usize = 10;
pub const PROBLEM_TEXT_MAX_LEN: usize = 2000;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const USE_CASE_LABEL_MAX_LEN: usize = 100;
pub const AI_RATIONALE_MAX_LEN: usize = 1000;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Character count, not byte count. Multi-byte submissions are measured the
/// same way the form presents them.
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Validate a public form submission, collecting every field failure.
pub fn validate_lead_submission(payload: &LeadSubmission) -> Result<(), AppError> {
    let mut details = Vec::new();

    let name_len = char_len(payload.name.trim());
    if name_len < NAME_MIN_LEN || name_len > NAME_MAX_LEN {
        details.push(format!(
            "name must be between {} and {} characters",
            NAME_MIN_LEN, NAME_MAX_LEN
        ));
    }

    if !is_valid_email(&payload.email) {
        details.push("email must be a valid email address".to_string());
    }

    if let Some(company) = &payload.company {
        if char_len(company) > COMPANY_MAX_LEN {
            details.push(format!(
                "company must be at most {} characters",
                COMPANY_MAX_LEN
            ));
        }
    }

    if let Some(website) = &payload.website {
        if url::Url::parse(website).is_err() {
            details.push("website must be a valid URL".to_string());
        }
    }

    let problem_len = char_len(&payload.problem_text);
    if problem_len < PROBLEM_TEXT_MIN_LEN || problem_len > PROBLEM_TEXT_MAX_LEN {
        details.push(format!(
            "problem_text must be between {} and {} characters",
            PROBLEM_TEXT_MIN_LEN, PROBLEM_TEXT_MAX_LEN
        ));
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(details))
    }
}

pub fn validate_login(payload: &LoginRequest) -> Result<(), AppError> {
    let mut details = Vec::new();

    if !is_valid_email(&payload.email) {
        details.push("email must be a valid email address".to_string());
    }
    if char_len(&payload.password) < PASSWORD_MIN_LEN {
        details.push(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_LEN
        ));
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(details))
    }
}

/// Validate a manual admin lead edit. Status legality is checked separately
/// against the lead's current state by the lifecycle module.
pub fn validate_lead_update(payload: &LeadUpdateRequest) -> Result<(), AppError> {
    let mut details = Vec::new();

    if let Some(label) = &payload.use_case_label {
        if char_len(label) > USE_CASE_LABEL_MAX_LEN {
            details.push(format!(
                "use_case_label must be at most {} characters",
                USE_CASE_LABEL_MAX_LEN
            ));
        }
    }

    if let Some(score) = payload.fit_score {
        if !(0..=100).contains(&score) {
            details.push("fit_score must be between 0 and 100".to_string());
        }
    }

    if let Some(rationale) = &payload.ai_rationale {
        if char_len(rationale) > AI_RATIONALE_MAX_LEN {
            details.push(format!(
                "ai_rationale must be at most {} characters",
                AI_RATIONALE_MAX_LEN
            ));
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(problem_text: &str) -> LeadSubmission {
        LeadSubmission {
            name: "Jane Doe".to_string(),
            email: "jane@x.com".to_string(),
            company: None,
            website: None,
            problem_text: problem_text.to_string(),
        }
    }

    #[test]
    fn problem_text_boundary() {
        // 9 chars rejected, 10 accepted
        assert!(validate_lead_submission(&submission("123456789")).is_err());
        assert!(validate_lead_submission(&submission("1234567890")).is_ok());
    }

    #[test]
    fn problem_text_upper_bound() {
        let max = "x".repeat(PROBLEM_TEXT_MAX_LEN);
        assert!(validate_lead_submission(&submission(&max)).is_ok());
        let too_long = "x".repeat(PROBLEM_TEXT_MAX_LEN + 1);
        assert!(validate_lead_submission(&submission(&too_long)).is_err());
    }

    #[test]
    fn name_bounds() {
        let mut payload = submission("We need help scaling our outbound sales");
        payload.name = "J".to_string();
        assert!(validate_lead_submission(&payload).is_err());
        payload.name = "Jo".to_string();
        assert!(validate_lead_submission(&payload).is_ok());
        payload.name = "x".repeat(NAME_MAX_LEN + 1);
        assert!(validate_lead_submission(&payload).is_err());
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("test.user+tag@sub.example.co.uk"));
        assert!(!is_valid_email("not_an_email"));
        assert!(!is_valid_email("missing@domain nospace"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
    }

    #[test]
    fn website_must_be_uri_when_present() {
        let mut payload = submission("We need help scaling our outbound sales");
        payload.website = Some("https://example.com".to_string());
        assert!(validate_lead_submission(&payload).is_ok());
        payload.website = Some("not a url".to_string());
        assert!(validate_lead_submission(&payload).is_err());
    }

    #[test]
    fn all_failures_are_collected() {
        let payload = LeadSubmission {
            name: "J".to_string(),
            email: "bad".to_string(),
            company: None,
            website: None,
            problem_text: "short".to_string(),
        };
        match validate_lead_submission(&payload).unwrap_err() {
            AppError::Validation(details) => assert_eq!(details.len(), 3),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn fit_score_range_enforced() {
        let ok = LeadUpdateRequest {
            fit_score: Some(100),
            ..Default::default()
        };
        assert!(validate_lead_update(&ok).is_ok());

        let too_high = LeadUpdateRequest {
            fit_score: Some(101),
            ..Default::default()
        };
        assert!(validate_lead_update(&too_high).is_err());

        let negative = LeadUpdateRequest {
            fit_score: Some(-1),
            ..Default::default()
        };
        assert!(validate_lead_update(&negative).is_err());
    }
}
