use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::core::domain::{
    ClassId, ExerciseId, Participant, ProblemId, Role, Submission, SubmissionId, SubmissionStatus,
    UserId,
};
use crate::core::errors::StoreError;
use crate::core::traits::store::{Roster, SubmissionStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BestSubmission {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
    pub achieved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    /// 1-based; `None` for participants who never submitted.
    pub position: Option<u32>,
    pub user_id: UserId,
    pub name: Option<String>,
    pub score: u32,
    pub best: Option<BestSubmission>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ranking {
    pub problem_id: ProblemId,
    pub exercise_id: ExerciseId,
    pub entries: Vec<RankEntry>,
    /// Teachers and admins who submitted. Not ranked.
    pub staff: Vec<RankEntry>,
}

/// Highest total score; among equals, the earliest one.
fn best_of<'a>(submissions: impl IntoIterator<Item = &'a Submission>) -> Option<&'a Submission> {
    submissions
        .into_iter()
        .filter(|s| s.status.is_terminal())
        .min_by_key(|s| (Reverse(s.total_score), s.submitted_at, s.id))
}

fn entry(user_id: UserId, name: Option<String>, best: Option<&Submission>) -> RankEntry {
    RankEntry {
        position: None,
        user_id,
        name,
        score: best.map_or(0, |s| s.total_score),
        best: best.map(|s| BestSubmission {
            submission_id: s.id,
            status: s.status,
            achieved_at: s.submitted_at,
        }),
    }
}

/// Orders `students` by their best submission for one problem.
///
/// Submitters come first by `(score desc, achieved_at asc)` and get
/// consecutive positions. Students without a terminal submission follow with
/// score 0 and no position. Submitters listed in `staff` are reported apart;
/// anyone else outside `students` is ignored.
pub fn rank(
    problem_id: ProblemId,
    exercise_id: ExerciseId,
    students: &[Participant],
    staff: &HashSet<UserId>,
    submissions: &[Submission],
) -> Ranking {
    let by_user: HashMap<UserId, Vec<&Submission>> = submissions
        .iter()
        .filter(|s| s.problem_id == problem_id && s.exercise_id == Some(exercise_id))
        .into_group_map_by(|s| s.user_id);

    let (submitted, absent): (Vec<RankEntry>, Vec<RankEntry>) = students
        .iter()
        .unique_by(|p| p.user_id)
        .map(|p| {
            let best = by_user.get(&p.user_id).and_then(|subs| best_of(subs.iter().copied()));
            entry(p.user_id, Some(p.name.clone()), best)
        })
        .partition(|e| e.best.is_some());

    let entries = submitted
        .into_iter()
        .sorted_by_key(|e| {
            (
                Reverse(e.score),
                e.best.as_ref().map(|b| b.achieved_at),
                e.user_id,
            )
        })
        .zip(1u32..)
        .map(|(e, position)| RankEntry {
            position: Some(position),
            ..e
        })
        .chain(absent.into_iter().sorted_by_key(|e| e.user_id))
        .collect();

    let staff_entries = by_user
        .iter()
        .filter(|(user_id, _)| staff.contains(*user_id))
        .filter_map(|(user_id, subs)| best_of(subs.iter().copied()).map(|best| entry(*user_id, None, Some(best))))
        .sorted_by_key(|e| (Reverse(e.score), e.user_id))
        .collect();

    Ranking {
        problem_id,
        exercise_id,
        entries,
        staff: staff_entries,
    }
}

/// Reads submissions and the roster on demand and ranks them.
#[derive(Clone, Debug)]
pub struct RankingService {
    store: Arc<dyn SubmissionStore>,
    roster: Arc<dyn Roster>,
}

impl RankingService {
    pub fn new(store: Arc<dyn SubmissionStore>, roster: Arc<dyn Roster>) -> Self {
        Self { store, roster }
    }

    #[tracing::instrument(skip(self))]
    pub async fn rank(
        &self,
        problem_id: ProblemId,
        exercise_id: ExerciseId,
        cohort: Option<ClassId>,
    ) -> Result<Ranking, StoreError> {
        let submissions = self.store.list_for(problem_id, exercise_id).await?;
        let students = self.roster.students(cohort).await?;

        let student_ids: HashSet<UserId> = students.iter().map(|p| p.user_id).collect();
        let mut staff = HashSet::new();
        for user_id in submissions.iter().map(|s| s.user_id).unique() {
            if student_ids.contains(&user_id) {
                continue;
            }
            if let Some(Role::Teacher | Role::Admin) = self.roster.role_of(user_id).await? {
                staff.insert(user_id);
            }
        }

        let ranking = rank(problem_id, exercise_id, &students, &staff, &submissions);
        tracing::debug!(
            "Ranked {} participants, {} staff entries",
            ranking.entries.len(),
            ranking.staff.len()
        );
        Ok(ranking)
    }
}
