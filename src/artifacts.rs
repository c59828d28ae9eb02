use crate::dom::text::visible_text;
use crate::errors::Result;
use crate::job::JobResult;
use crate::mapping::field::FieldMapping;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: String,
}

/// Chronological record of what a job did to the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    entries: Vec<ActionEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: &str, detail: impl Into<String>) {
        self.entries.push(ActionEntry {
            at: Utc::now(),
            action: action.to_string(),
            detail: detail.into(),
        });
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub url: String,
    pub message: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

pub enum Artifact<'a> {
    /// `name.png`, `name.html` and `name.txt`.
    Checkpoint {
        name: &'a str,
        screenshot: Option<&'a [u8]>,
        html: &'a str,
    },
    /// `mapping.json`.
    Mappings(&'a [FieldMapping]),
    /// `data.json` and `data.md`.
    Result(&'a JobResult),
    /// `actions.json`.
    Actions(&'a ActionLog),
    /// `error.json`, `error.png` and `page.html`.
    Error {
        report: &'a ErrorReport,
        screenshot: Option<&'a [u8]>,
        html: Option<&'a str>,
    },
}

/// Writes every artifact of a job under `{root}/{index:03}`.
#[derive(Debug, Clone)]
pub struct ArtifactRecorder {
    root: PathBuf,
}

impl ArtifactRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job: usize) -> PathBuf {
        self.root.join(format!("{:03}", job))
    }

    /// Writes `artifact` and returns the created paths. Returns only after
    /// every file is on disk.
    pub async fn record(&self, job: usize, artifact: Artifact<'_>) -> Result<Vec<PathBuf>> {
        let dir = self.job_dir(job);
        tokio::fs::create_dir_all(&dir).await?;
        let mut written = Vec::new();

        match artifact {
            Artifact::Checkpoint {
                name,
                screenshot,
                html,
            } => {
                if let Some(png) = screenshot {
                    written.push(write(&dir.join(format!("{}.png", name)), png).await?);
                }
                written.push(write(&dir.join(format!("{}.html", name)), html.as_bytes()).await?);
                let text = visible_text(html);
                written.push(write(&dir.join(format!("{}.txt", name)), text.as_bytes()).await?);
            }
            Artifact::Mappings(mappings) => {
                let json = serde_json::to_vec_pretty(mappings)?;
                written.push(write(&dir.join("mapping.json"), &json).await?);
            }
            Artifact::Result(result) => {
                let json = serde_json::to_vec_pretty(result)?;
                written.push(write(&dir.join("data.json"), &json).await?);
                let markdown = result.to_markdown();
                written.push(write(&dir.join("data.md"), markdown.as_bytes()).await?);
            }
            Artifact::Actions(log) => {
                let json = serde_json::to_vec_pretty(log.entries())?;
                written.push(write(&dir.join("actions.json"), &json).await?);
            }
            Artifact::Error {
                report,
                screenshot,
                html,
            } => {
                let json = serde_json::to_vec_pretty(report)?;
                written.push(write(&dir.join("error.json"), &json).await?);
                if let Some(png) = screenshot {
                    written.push(write(&dir.join("error.png"), png).await?);
                }
                if let Some(html) = html {
                    written.push(write(&dir.join("page.html"), html.as_bytes()).await?);
                }
            }
        }

        debug!(job, "recorded {} artifact files", written.len());
        Ok(written)
    }
}

async fn write(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::write(path, bytes).await?;
    Ok(path.to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub index: usize,
    pub url: String,
    pub success: bool,
    pub fields_filled: usize,
    pub fields_skipped: usize,
    pub errors: Vec<String>,
    pub directory: PathBuf,
    pub screenshot: Option<PathBuf>,
    pub error_details: Option<PathBuf>,
    pub page_html: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &JobSummary> {
        self.jobs.iter().filter(|j| !j.success)
    }
}

/// Rebuilds the run summary purely from the job directories under `root` and
/// writes it to `root/summary.json`.
pub async fn summarize(root: &Path) -> Result<RunSummary> {
    let mut job_dirs: Vec<(usize, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(index) = index {
            job_dirs.push((index, path));
        }
    }
    job_dirs.sort_by_key(|(index, _)| *index);

    let mut jobs = Vec::new();
    for (index, dir) in job_dirs {
        let existing = |name: &str| {
            let path = dir.join(name);
            path.is_file().then_some(path)
        };
        let error_details = existing("error.json");
        let page_html = existing("page.html");
        let screenshot = existing("error.png").or_else(|| existing("after_submit.png"));

        let data = match tokio::fs::read(dir.join("data.json")).await {
            Ok(bytes) => match serde_json::from_slice::<JobResult>(&bytes) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("unreadable {}: {}", dir.join("data.json").display(), e);
                    None
                }
            },
            Err(_) => None,
        };

        let summary = match data {
            Some(result) => JobSummary {
                index,
                url: result.url,
                success: result.success,
                fields_filled: result.fields_filled,
                fields_skipped: result.fields_skipped,
                errors: result.errors,
                directory: dir.clone(),
                screenshot: screenshot.or_else(|| result.screenshot_path.map(PathBuf::from)),
                error_details,
                page_html,
            },
            None => {
                let url = match &error_details {
                    Some(path) => tokio::fs::read(path)
                        .await
                        .ok()
                        .and_then(|b| serde_json::from_slice::<ErrorReport>(&b).ok())
                        .map(|r| r.url)
                        .unwrap_or_default(),
                    None => String::new(),
                };
                JobSummary {
                    index,
                    url,
                    success: false,
                    fields_filled: 0,
                    fields_skipped: 0,
                    errors: vec!["job produced no result data".to_string()],
                    directory: dir.clone(),
                    screenshot,
                    error_details,
                    page_html,
                }
            }
        };
        jobs.push(summary);
    }

    let succeeded = jobs.iter().filter(|j| j.success).count();
    let summary = RunSummary {
        generated_at: Utc::now(),
        total: jobs.len(),
        succeeded,
        failed: jobs.len() - succeeded,
        jobs,
    };

    tokio::fs::create_dir_all(root).await?;
    let json = serde_json::to_vec_pretty(&summary)?;
    tokio::fs::write(root.join("summary.json"), json).await?;
    info!(
        "summary: {} jobs, {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, url: &str, success: bool) -> JobResult {
        let mut result = JobResult::new(index, url);
        result.success = success;
        result.fields_filled = 3;
        result
    }

    #[tokio::test]
    async fn test_checkpoint_writes_three_variants() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ArtifactRecorder::new(dir.path());
        let written = recorder
            .record(
                1,
                Artifact::Checkpoint {
                    name: "initial",
                    screenshot: Some(&[0x89u8, 0x50][..]),
                    html: "<html><body><p>Apply now</p></body></html>",
                },
            )
            .await
            .unwrap();

        assert_eq!(written.len(), 3);
        let job_dir = dir.path().join("001");
        assert!(job_dir.join("initial.png").is_file());
        assert_eq!(
            std::fs::read_to_string(job_dir.join("initial.txt")).unwrap(),
            "Apply now"
        );
    }

    #[tokio::test]
    async fn test_summarize_is_rederivable() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ArtifactRecorder::new(dir.path());
        recorder
            .record(1, Artifact::Result(&result(1, "https://a.example/1", true)))
            .await
            .unwrap();
        recorder
            .record(2, Artifact::Result(&result(2, "https://b.example/2", false)))
            .await
            .unwrap();
        let report = ErrorReport {
            url: "https://c.example/3".into(),
            message: "navigation failed".into(),
            attempt: 2,
            at: Utc::now(),
        };
        recorder
            .record(
                3,
                Artifact::Error {
                    report: &report,
                    screenshot: None,
                    html: Some("<html></html>"),
                },
            )
            .await
            .unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();

        let first = summarize(dir.path()).await.unwrap();
        let second = summarize(dir.path()).await.unwrap();

        assert_eq!(first.total, 3);
        assert_eq!(first.succeeded, 1);
        assert_eq!(first.jobs, second.jobs);
        let failures: Vec<_> = first.failures().collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[1].url, "https://c.example/3");
        assert!(failures[1].page_html.is_some());
        assert!(dir.path().join("summary.json").is_file());
    }
}
