//! Declarative step lists read from YAML. Steps run strictly in order; a
//! failing step stops the pipeline unless it is marked `optional`.

use crate::core::{BrowserTrait, Config, PageDriver};
use crate::errors::{FormError, Result};
use crate::fill::{validate_date_format, FillExecutor, FillReport};
use crate::mapping::{FieldMapping, FieldType, Locator};
use crate::profile::{deep_merge, ProfileData};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;
const NAVIGATION_POLL: Duration = Duration::from_millis(50);

lazy_static! {
    static ref VARIABLE: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub headless: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub global: GlobalSettings,
    /// Variables available to `${...}` placeholders.
    #[serde(default)]
    pub defaults: Value,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(flatten)]
    pub step: Step,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub wait_for_navigation: bool,
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Navigate { url: String },
    Click { selector: String },
    Fill { fields: Vec<FillField> },
    Upload { selector: String, file: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillField {
    pub selector: String,
    pub value: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    /// Output format for `date` fields, e.g. `%d.%m.%Y`.
    #[serde(default)]
    pub date_format: Option<String>,
}

impl PipelineDefinition {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(text)?;
        if definition.tasks.is_empty() {
            return Err(FormError::Pipeline(format!("pipeline '{}' has no tasks", definition.name)));
        }
        for task in &definition.tasks {
            let Step::Fill { fields } = &task.step else {
                continue;
            };
            for format in fields.iter().filter_map(|f| f.date_format.as_deref()) {
                validate_date_format(format)
                    .map_err(|e| FormError::Pipeline(format!("task '{}': {}", task.name, e)))?;
            }
        }
        Ok(definition)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            FormError::Pipeline(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }
}

/// Replaces each `${a.b}` with the dotted lookup in `variables`. Unknown
/// placeholders are left as written.
pub fn resolve_variables(template: &str, variables: &Value) -> String {
    VARIABLE
        .replace_all(template, |caps: &Captures| {
            let mut current = variables;
            for key in caps[1].trim().split('.') {
                match current.get(key) {
                    Some(next) => current = next,
                    None => return caps[0].to_string(),
                }
            }
            match current {
                Value::String(s) => s.clone(),
                Value::Null | Value::Object(_) | Value::Array(_) => caps[0].to_string(),
                other => other.to_string(),
            }
        })
        .into_owned()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub completed: Vec<String>,
    /// Optional steps that failed and were passed over.
    pub skipped: Vec<String>,
    pub fills: Vec<FillReport>,
}

pub struct PipelineRunner {
    definition: PipelineDefinition,
    variables: Value,
    error_dir: PathBuf,
}

impl PipelineRunner {
    /// `overrides` win over the definition's `defaults`.
    pub fn new(definition: PipelineDefinition, overrides: Value) -> Self {
        let mut variables = match &definition.defaults {
            Value::Object(_) => definition.defaults.clone(),
            _ => Value::Object(Default::default()),
        };
        if overrides.is_object() {
            deep_merge(&mut variables, overrides);
        }
        Self {
            definition,
            variables,
            error_dir: PathBuf::from("."),
        }
    }

    pub fn with_error_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_dir = dir.into();
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Launches `browser` with the pipeline's global settings applied on top
    /// of `config` and always closes it again.
    pub async fn run<B: BrowserTrait>(&self, browser: &mut B, config: &Config) -> Result<PipelineReport> {
        let mut config = config.clone();
        if let Some(headless) = self.definition.global.headless {
            config.browser.headless = headless;
        }

        info!(
            pipeline = %self.definition.name,
            "starting pipeline: {}",
            self.definition.description.as_deref().unwrap_or("")
        );
        browser.launch(&config).await?;
        let outcome = match browser.new_page().await {
            Ok(page) => {
                let outcome = self.run_on_page(&page).await;
                if let Err(e) = page.close().await {
                    warn!("page close failed: {}", e);
                }
                outcome
            }
            Err(e) => Err(e),
        };
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {}", e);
        }
        outcome
    }

    pub async fn run_on_page<P: PageDriver + ?Sized>(&self, page: &P) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        for task in &self.definition.tasks {
            info!(task = %task.name, "running task");
            match self.execute(page, task).await {
                Ok(fill) => {
                    report.fills.extend(fill);
                    report.completed.push(task.name.clone());
                }
                Err(e) if task.optional => {
                    warn!(task = %task.name, "optional task failed: {}", e);
                    report.skipped.push(task.name.clone());
                }
                Err(e) => {
                    error!(task = %task.name, "task failed: {}", e);
                    self.save_error_screenshot(page).await;
                    return Err(FormError::Pipeline(format!("task '{}' failed: {}", task.name, e)));
                }
            }
        }
        info!(
            "pipeline finished: {} completed, {} skipped",
            report.completed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn timeout(&self, task: &Task) -> Duration {
        Duration::from_millis(
            task.timeout_ms
                .or(self.definition.global.timeout_ms)
                .unwrap_or(DEFAULT_STEP_TIMEOUT_MS),
        )
    }

    async fn execute<P: PageDriver + ?Sized>(&self, page: &P, task: &Task) -> Result<Option<FillReport>> {
        let timeout = self.timeout(task);
        let url_before = if task.wait_for_navigation {
            page.current_url().await.ok()
        } else {
            None
        };

        let mut fill_report = None;
        match &task.step {
            Step::Navigate { url } => {
                page.navigate(&resolve_variables(url, &self.variables), timeout)
                    .await?;
            }
            Step::Click { selector } => {
                let selector = resolve_variables(selector, &self.variables);
                page.wait_for_selector(&selector, timeout).await?;
                page.click(&selector).await?;
            }
            Step::Fill { fields } => {
                let report = self.fill(page, fields, timeout).await;
                if report.is_blocked() {
                    return Err(FormError::Pipeline(report.blocking.join("; ")));
                }
                fill_report = Some(report);
            }
            Step::Upload { selector, file } => {
                let selector = resolve_variables(selector, &self.variables);
                let path = absolute(&resolve_variables(file, &self.variables))?;
                if !path.is_file() {
                    return Err(FormError::FileMissing(path.display().to_string()));
                }
                page.wait_for_selector(&selector, timeout).await?;
                page.upload_files(&selector, &[path]).await?;
            }
        }

        if let Some(before) = url_before {
            wait_for_url_change(page, &before, timeout).await?;
        }
        if let Some(ms) = task.wait_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(fill_report)
    }

    async fn fill<P: PageDriver + ?Sized>(&self, page: &P, fields: &[FillField], timeout: Duration) -> FillReport {
        let mappings: Vec<FieldMapping> = fields
            .iter()
            .map(|field| {
                let selector = resolve_variables(&field.selector, &self.variables);
                let mapping = FieldMapping::manual(
                    Locator::css(selector.clone()),
                    &selector,
                    field.field_type.unwrap_or(FieldType::Text),
                )
                .with_static_value(resolve_variables(&field.value, &self.variables))
                .set_optional(false);
                match &field.date_format {
                    Some(format) => mapping.with_date_format(format),
                    None => mapping,
                }
            })
            .collect();
        let profile = ProfileData::from_value(self.variables.clone());
        FillExecutor::new(timeout, Duration::ZERO)
            .fill(page, &mappings, &profile)
            .await
    }

    async fn save_error_screenshot<P: PageDriver + ?Sized>(&self, page: &P) {
        let png = match page.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                warn!("could not capture error screenshot: {}", e);
                return;
            }
        };
        let name = format!("error-{}.png", Utc::now().format("%Y-%m-%dT%H-%M-%S"));
        let path = self.error_dir.join(name);
        let written = async {
            tokio::fs::create_dir_all(&self.error_dir).await?;
            tokio::fs::write(&path, png).await
        };
        match written.await {
            Ok(()) => info!("error screenshot saved to {}", path.display()),
            Err(e) => warn!("could not write {}: {}", path.display(), e),
        }
    }
}

fn absolute(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

async fn wait_for_url_change<P: PageDriver + ?Sized>(page: &P, before: &str, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if page.current_url().await? != before {
            return Ok(());
        }
        tokio::time::sleep(NAVIGATION_POLL).await;
    }
    Err(FormError::Timeout(format!("no navigation away from {}", before)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::RawElement;
    use crate::testing::{MockBrowser, MockPage};
    use serde_json::json;

    const PIPELINE: &str = r##"
name: apply
description: Fill the demo form
global:
  headless: true
  timeout_ms: 20
defaults:
  user:
    first: Anna
    email: anna@example.com
  base: http://localhost:8080
tasks:
  - name: open
    type: navigate
    url: ${base}/apply
  - name: cookies
    type: click
    selector: "#accept-cookies"
    optional: true
  - name: details
    type: fill
    fields:
      - selector: input[name="firstname"]
        value: ${user.first}
      - selector: input[name="email"]
        value: ${user.email}
        type: email
  - name: send
    type: click
    selector: "#send"
    wait_for_navigation: true
"##;

    fn page() -> MockPage {
        MockPage::new()
            .with_element(RawElement::input("firstname"))
            .with_element(RawElement::input("email"))
            .with_button("#send", "Absenden")
            .with_success_text("Danke")
    }

    #[test]
    fn test_resolve_variables() {
        let vars = json!({"user": {"first": "Anna", "age": 34}, "flag": true});
        assert_eq!(resolve_variables("Hi ${user.first}", &vars), "Hi Anna");
        assert_eq!(resolve_variables("${user.age}/${flag}", &vars), "34/true");
        assert_eq!(resolve_variables("${user.missing}", &vars), "${user.missing}");
        assert_eq!(resolve_variables("${user}", &vars), "${user}");
    }

    #[test]
    fn test_parse_definition() {
        let definition = PipelineDefinition::from_yaml(PIPELINE).unwrap();
        assert_eq!(definition.tasks.len(), 4);
        assert!(definition.tasks[1].optional);
        assert!(matches!(definition.tasks[2].step, Step::Fill { ref fields } if fields.len() == 2));
        assert_eq!(
            definition.tasks[2].step,
            Step::Fill {
                fields: vec![
                    FillField {
                        selector: "input[name=\"firstname\"]".into(),
                        value: "${user.first}".into(),
                        field_type: None,
                        date_format: None,
                    },
                    FillField {
                        selector: "input[name=\"email\"]".into(),
                        value: "${user.email}".into(),
                        field_type: Some(FieldType::Email),
                        date_format: None,
                    },
                ]
            }
        );
        assert!(PipelineDefinition::from_yaml("name: empty\ntasks: []").is_err());
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order_and_skips_optional_failures() {
        let page = page();
        let runner = PipelineRunner::new(PipelineDefinition::from_yaml(PIPELINE).unwrap(), Value::Null);
        let mut browser = MockBrowser::new(page.clone());

        let report = runner.run(&mut browser, &Config::default()).await.unwrap();

        assert_eq!(report.completed, vec!["open", "details", "send"]);
        assert_eq!(report.skipped, vec!["cookies"]);
        assert_eq!(page.value_of("firstname").as_deref(), Some("Anna"));
        assert!(page.was_submitted());
        assert!(!browser.is_running());
    }

    #[tokio::test]
    async fn test_fill_applies_date_format() {
        let yaml = r#"
name: dates
defaults:
  birth: "1990-12-24"
tasks:
  - name: details
    type: fill
    fields:
      - selector: input[name="birthdate"]
        value: ${birth}
        type: date
        date_format: "%d.%m.%Y"
"#;
        let mut birth = RawElement::input("birthdate");
        birth.input_type = "date".into();
        let page = MockPage::new().with_element(birth);
        let runner = PipelineRunner::new(PipelineDefinition::from_yaml(yaml).unwrap(), Value::Null);

        runner.run_on_page(&page).await.unwrap();
        assert_eq!(page.value_of("birthdate").as_deref(), Some("24.12.1990"));

        let broken = yaml.replace("%d.%m.%Y", "%d.%Q");
        let err = PipelineDefinition::from_yaml(&broken).unwrap_err();
        assert!(err.to_string().contains("task 'details'"));
    }

    #[tokio::test]
    async fn test_required_failure_stops_and_saves_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = PIPELINE.replace("\"#send\"", "\"#nowhere\"");
        let runner = PipelineRunner::new(
            PipelineDefinition::from_yaml(&yaml).unwrap(),
            json!({"user": {"first": "Jan"}}),
        )
        .with_error_dir(dir.path());
        let page = page();

        let err = runner.run_on_page(&page).await.unwrap_err();

        assert!(err.to_string().contains("task 'send' failed"));
        assert_eq!(page.value_of("firstname").as_deref(), Some("Jan"));
        let screenshots = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(screenshots, 1);
    }
}
