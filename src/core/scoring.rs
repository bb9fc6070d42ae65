use crate::core::domain::{ScoreBreakdown, SubmissionStatus};

/// `floor(budget * passed / total)`. With no fixtures the whole budget is
/// awarded: absent fixtures say nothing about the submission.
pub fn runtime_score(budget: u32, passed: u32, total: u32) -> u32 {
    if total == 0 {
        return budget;
    }
    let passed = passed.min(total);
    (u64::from(budget) * u64::from(passed) / u64::from(total)) as u32
}

pub fn breakdown(code_check_score: u32, runtime_budget: u32, passed: u32, total: u32) -> ScoreBreakdown {
    let runtime_score = runtime_score(runtime_budget, passed, total);
    ScoreBreakdown {
        code_check_score,
        runtime_score,
        total_score: code_check_score + runtime_score,
        passed_count: passed.min(total),
        total_count: total,
    }
}

/// Scores for a submission that never reached execution.
pub fn compile_only(code_check_score: u32) -> ScoreBreakdown {
    ScoreBreakdown {
        code_check_score,
        runtime_score: 0,
        total_score: code_check_score,
        passed_count: 0,
        total_count: 0,
    }
}

pub fn zeroed() -> ScoreBreakdown {
    ScoreBreakdown::default()
}

pub fn status_for(scores: &ScoreBreakdown) -> SubmissionStatus {
    if scores.passed_count == scores.total_count {
        SubmissionStatus::Accepted
    } else {
        SubmissionStatus::WrongAnswer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_credit_is_floored() {
        assert_eq!(runtime_score(80, 2, 3), 53);
        assert_eq!(runtime_score(80, 1, 3), 26);
        assert_eq!(runtime_score(80, 3, 3), 80);
        assert_eq!(runtime_score(80, 0, 3), 0);
    }

    #[test]
    fn test_no_fixtures_full_credit() {
        assert_eq!(runtime_score(80, 0, 0), 80);
        let scores = breakdown(20, 80, 0, 0);
        assert_eq!(scores.total_score, 100);
        assert_eq!(status_for(&scores), SubmissionStatus::Accepted);
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        for (code, budget, passed, total) in [(20, 80, 2, 3), (0, 100, 1, 7), (15, 0, 4, 4), (5, 3, 1, 2)] {
            let scores = breakdown(code, budget, passed, total);
            assert_eq!(scores.total_score, scores.code_check_score + scores.runtime_score);
            assert!(scores.runtime_score <= budget);
        }
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(status_for(&breakdown(20, 80, 2, 3)), SubmissionStatus::WrongAnswer);
        assert_eq!(status_for(&breakdown(20, 80, 3, 3)), SubmissionStatus::Accepted);
    }

    #[test]
    fn test_compile_only() {
        let scores = compile_only(20);
        assert_eq!(scores.runtime_score, 0);
        assert_eq!(scores.total_score, 20);
    }
}
