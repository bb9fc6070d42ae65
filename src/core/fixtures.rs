use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::constants::DIAGNOSTIC_PREVIEW_CHARS;
use crate::core::domain::TestCase;
use crate::core::errors::EvaluationError;
use crate::core::normalize;

/// Discovers `{n}.in` / `{n}.out` pairs under a problem's fixture directory.
///
/// Numbering starts at `first_index` (0 or 1, fixed per installation) and
/// stops at the first index where neither file exists. An index where only
/// one side exists is skipped with a warning. A missing directory yields an
/// empty list: absent fixtures are a normal condition.
#[derive(Clone, Debug)]
pub struct FixtureLoader {
    root: PathBuf,
    first_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FixturePreview {
    pub index: u32,
    pub input: String,
    pub expected: String,
}

impl FixtureLoader {
    pub fn new<P: AsRef<Path>>(root: P, first_index: u32) -> Self {
        Self {
            root: root.as_ref().into(),
            first_index,
        }
    }

    pub fn problem_dir(&self, data_path: &str) -> PathBuf {
        self.root.join(data_path.trim_start_matches('/'))
    }

    #[tracing::instrument(skip(self))]
    pub async fn load(&self, data_path: Option<&str>) -> Result<Vec<TestCase>, EvaluationError> {
        let Some(data_path) = data_path.filter(|path| !path.trim().is_empty()) else {
            tracing::debug!("Problem has no fixture directory");
            return Ok(Vec::new());
        };

        let dir = self.problem_dir(data_path);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            tracing::debug!("Fixture directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut cases = Vec::new();
        let mut index = self.first_index;
        loop {
            let input_path = dir.join(format!("{}.in", index));
            let output_path = dir.join(format!("{}.out", index));
            let has_input = fs::try_exists(&input_path).await.unwrap_or(false);
            let has_output = fs::try_exists(&output_path).await.unwrap_or(false);

            match (has_input, has_output) {
                (false, false) => break,
                (true, true) => {
                    let input = read_fixture(&input_path).await?;
                    let expected = read_fixture(&output_path).await?;
                    cases.push(TestCase {
                        index,
                        input,
                        expected,
                    });
                }
                (true, false) => {
                    tracing::warn!("Skipping fixture {}: {} is missing", index, output_path.display());
                }
                (false, true) => {
                    tracing::warn!("Skipping fixture {}: {} is missing", index, input_path.display());
                }
            }
            index += 1;
        }

        tracing::debug!("Loaded {} fixture pairs from {}", cases.len(), dir.display());
        Ok(cases)
    }

    /// Decoded, truncated fixture text for submission detail views.
    pub async fn preview(&self, data_path: Option<&str>) -> Result<Vec<FixturePreview>, EvaluationError> {
        let cases = self.load(data_path).await?;
        Ok(cases
            .iter()
            .map(|case| FixturePreview {
                index: case.index,
                input: normalize::preview(&normalize::decode(&case.input), DIAGNOSTIC_PREVIEW_CHARS),
                expected: normalize::preview(
                    &normalize::decode(&case.expected),
                    DIAGNOSTIC_PREVIEW_CHARS,
                ),
            })
            .collect())
    }
}

async fn read_fixture(path: &Path) -> Result<Vec<u8>, EvaluationError> {
    fs::read(path)
        .await
        .map_err(|e| EvaluationError::Fixtures(format!("{}: {}", path.display(), e)))
}
