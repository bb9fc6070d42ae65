use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use itertools::Itertools;

use crate::core::domain::{
    ClassId, Exercise, ExerciseId, Participant, Problem, ProblemId, Role, Submission,
    SubmissionId, UserId,
};
use crate::core::errors::StoreError;
use crate::core::traits::store::{ProblemCatalog, Roster, SubmissionStore};

/// Process-local store for submissions, the problem catalog and the roster.
#[derive(Debug)]
pub struct MemoryStore {
    next_id: AtomicI64,
    submissions: DashMap<SubmissionId, Submission>,
    problems: DashMap<ProblemId, Problem>,
    exercises: DashMap<ExerciseId, Exercise>,
    participants: DashMap<UserId, Participant>,
    memberships: DashMap<ClassId, Vec<UserId>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            submissions: DashMap::new(),
            problems: DashMap::new(),
            exercises: DashMap::new(),
            participants: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    pub fn add_problem(&self, problem: Problem) {
        self.problems.insert(problem.id, problem);
    }

    pub fn add_exercise(&self, exercise: Exercise) {
        self.exercises.insert(exercise.id, exercise);
    }

    pub fn add_participant(&self, participant: Participant, classes: &[ClassId]) {
        for class_id in classes {
            self.memberships
                .entry(*class_id)
                .or_default()
                .push(participant.user_id);
        }
        self.participants.insert(participant.user_id, participant);
    }

    pub fn get_submission(&self, id: SubmissionId) -> Option<Submission> {
        self.submissions.get(&id).map(|entry| entry.value().clone())
    }

    /// Every stored submission, ordered by id.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .iter()
            .map(|entry| entry.value().clone())
            .sorted_by_key(|submission| submission.id)
            .collect()
    }
}

#[async_trait::async_trait]
impl SubmissionStore for MemoryStore {
    async fn create(&self, submission: Submission) -> Result<Submission, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = Submission { id, ..submission };
        self.submissions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, submission: &Submission) -> Result<(), StoreError> {
        match self.submissions.get_mut(&submission.id) {
            Some(mut entry) => {
                *entry = submission.clone();
                Ok(())
            }
            None => Err(StoreError::MissingSubmission(submission.id)),
        }
    }

    async fn get(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.get_submission(id))
    }

    async fn list_for(
        &self,
        problem_id: ProblemId,
        exercise_id: ExerciseId,
    ) -> Result<Vec<Submission>, StoreError> {
        Ok(self
            .submissions()
            .into_iter()
            .filter(|s| s.problem_id == problem_id && s.exercise_id == Some(exercise_id))
            .collect())
    }
}

#[async_trait::async_trait]
impl ProblemCatalog for MemoryStore {
    async fn problem(&self, id: ProblemId) -> Result<Option<Problem>, StoreError> {
        Ok(self.problems.get(&id).map(|entry| entry.value().clone()))
    }

    async fn exercise(&self, id: ExerciseId) -> Result<Option<Exercise>, StoreError> {
        Ok(self.exercises.get(&id).map(|entry| entry.value().clone()))
    }
}

#[async_trait::async_trait]
impl Roster for MemoryStore {
    async fn students(&self, cohort: Option<ClassId>) -> Result<Vec<Participant>, StoreError> {
        let members: Vec<UserId> = match cohort {
            Some(class_id) => self
                .memberships
                .get(&class_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default(),
            None => self.participants.iter().map(|entry| *entry.key()).collect(),
        };

        Ok(members
            .into_iter()
            .unique()
            .filter_map(|user_id| self.participants.get(&user_id).map(|p| p.value().clone()))
            .filter(|p| p.role == Role::Student)
            .sorted_by_key(|p| p.user_id)
            .collect())
    }

    async fn role_of(&self, user_id: UserId) -> Result<Option<Role>, StoreError> {
        Ok(self.participants.get(&user_id).map(|p| p.role))
    }
}
