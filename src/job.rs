use crate::artifacts::{summarize, ActionLog, Artifact, ArtifactRecorder, ErrorReport, RunSummary};
use crate::core::{BrowserTrait, Config, PageDriver, PageQuery};
use crate::dom::{page_excerpt, ElementDescriptor, ElementInspector, TabOrderMapper};
use crate::errors::{FormError, Result};
use crate::fill::{submit_form, FieldOutcome, FillExecutor, SubmitMethod};
use crate::mapping::{FieldMapping, HeuristicMapper, LlmClassifier, Locator, MappingSet, PromptContext};
use crate::profile::ProfileData;
use crate::strategy::{strategy_for_url, Strategy};
use crate::verify::{content_hash, FormValidator, SubmissionVerdict, SubmissionVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PREP_CLICK_TIMEOUT: Duration = Duration::from_millis(1_500);

/// Outcome of one URL. Built up while the job runs and written once at the
/// end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub index: usize,
    pub url: String,
    pub strategy: Strategy,
    pub success: bool,
    pub attempts: u32,
    pub fields_filled: usize,
    pub fields_skipped: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Percentage of fillable elements that received a mapping with a value
    /// source.
    pub coverage: f64,
    pub screenshot_path: Option<String>,
    pub html_snapshot_paths: Vec<String>,
    pub mappings: Vec<FieldMapping>,
    pub fields: Vec<FieldOutcome>,
    pub submit_method: Option<SubmitMethod>,
    pub submission: Option<SubmissionVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl JobResult {
    pub fn new(index: usize, url: &str) -> Self {
        Self {
            index,
            url: url.to_string(),
            strategy: strategy_for_url(url),
            success: false,
            attempts: 0,
            fields_filled: 0,
            fields_skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            coverage: 0.0,
            screenshot_path: None,
            html_snapshot_paths: Vec::new(),
            mappings: Vec::new(),
            fields: Vec::new(),
            submit_method: None,
            submission: None,
            started_at: Utc::now(),
            finished_at: None,
            submitted_at: None,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("# Job {:03}\n\n", self.index));
        md.push_str(&format!("- **URL:** {}\n", self.url));
        md.push_str(&format!("- **Strategy:** {}\n", self.strategy));
        md.push_str(&format!(
            "- **Result:** {}\n",
            if self.success { "success" } else { "failure" }
        ));
        md.push_str(&format!("- **Attempts:** {}\n", self.attempts));
        md.push_str(&format!(
            "- **Fields:** {} filled, {} skipped, {} errors\n",
            self.fields_filled,
            self.fields_skipped,
            self.errors.len()
        ));
        md.push_str(&format!("- **Coverage:** {:.0}%\n", self.coverage));
        md.push_str(&format!("- **Started:** {}\n", self.started_at.to_rfc3339()));
        if let Some(at) = self.submitted_at {
            md.push_str(&format!("- **Submitted:** {}\n", at.to_rfc3339()));
        }
        if let Some(verdict) = &self.submission {
            md.push_str(&format!("- **Verification:** {:?}\n", verdict.outcome));
        }

        if !self.fields.is_empty() {
            md.push_str("\n## Fields\n\n| Field | Locator | Type | Status | Value |\n|---|---|---|---|---|\n");
            for field in &self.fields {
                md.push_str(&format!(
                    "| {} | `{}` | {} | {:?} | {} |\n",
                    field.field_name.replace('|', "\\|"),
                    field.locator.replace('|', "\\|"),
                    field.field_type,
                    field.status,
                    field.value.as_deref().unwrap_or("").replace('|', "\\|"),
                ));
            }
        }

        for (title, items) in [("Errors", &self.errors), ("Warnings", &self.warnings)] {
            if !items.is_empty() {
                md.push_str(&format!("\n## {}\n\n", title));
                for item in items {
                    md.push_str(&format!("- {}\n", item));
                }
            }
        }

        if !self.html_snapshot_paths.is_empty() {
            md.push_str("\n## Snapshots\n\n");
            for path in &self.html_snapshot_paths {
                md.push_str(&format!("- {}\n", path));
            }
        }
        md
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Runs the whole pipeline against one already-open page.
pub struct JobRunner<'a> {
    config: &'a Config,
    profile: &'a ProfileData,
    recorder: &'a ArtifactRecorder,
    inspector: ElementInspector,
    heuristics: HeuristicMapper,
    validator: FormValidator,
    verifier: SubmissionVerifier,
}

impl<'a> JobRunner<'a> {
    pub fn new(config: &'a Config, profile: &'a ProfileData, recorder: &'a ArtifactRecorder) -> Self {
        Self {
            config,
            profile,
            recorder,
            inspector: ElementInspector::new(),
            heuristics: HeuristicMapper::new(),
            validator: FormValidator::new(),
            verifier: SubmissionVerifier::from_config(&config.verify),
        }
    }

    /// Navigates, maps, fills, validates and (unless dry-running) submits.
    /// An `Err` is a job-level failure; `result` holds whatever was reached.
    pub async fn process<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        classifier: &mut LlmClassifier,
        result: &mut JobResult,
        log: &mut ActionLog,
    ) -> Result<()> {
        let session = &self.config.session;
        let url = result.url.clone();
        let strategy = result.strategy;

        info!(job = result.index, url = %url, strategy = %strategy, "processing job");
        page.navigate(&url, session.navigation_timeout()).await?;
        log.push("navigate", url.clone());

        for selector in strategy.preparation_clicks() {
            if page.wait_for_selector(selector, PREP_CLICK_TIMEOUT).await.is_ok()
                && page.click(selector).await.is_ok()
            {
                debug!(selector, "preparation click");
                log.push("prep_click", *selector);
            }
        }

        let initial_html = self.checkpoint(page, "initial", result).await;

        let mut descriptors = self.inspector.inspect(page).await;
        if descriptors.is_empty() {
            debug!("no elements on first inspection, waiting for the page to settle");
            tokio::time::sleep(session.settle_delay()).await;
            descriptors = self.inspector.inspect(page).await;
        }
        if descriptors.iter().all(|d| !d.is_fillable()) {
            return Err(FormError::NoFormFields(url));
        }
        log.push("inspect", format!("{} elements", descriptors.len()));

        let mappings = self
            .build_mappings(
                page,
                &host_of(&url),
                &descriptors,
                strategy,
                initial_html.as_deref(),
                classifier,
                log,
            )
            .await;
        result.coverage = coverage(&descriptors, &mappings);
        result.mappings = mappings.as_slice().to_vec();
        if let Err(e) = self
            .recorder
            .record(result.index, Artifact::Mappings(mappings.as_slice()))
            .await
        {
            warn!("could not record mappings: {}", e);
        }

        let mut executor = FillExecutor::new(session.element_timeout(), session.inter_field_delay());
        if self.config.run.tab_order_fallback {
            match TabOrderMapper::new().map_by_tab_order(page).await {
                Ok(map) if !map.is_empty() => {
                    log.push("tab_order", format!("{} positional fields", map.len()));
                    executor = executor.with_tab_order(map);
                }
                Ok(_) => {}
                Err(e) => warn!("tab-order walk failed: {}", e),
            }
        }

        let report = executor.fill(page, mappings.iter(), self.profile).await;
        result.fields_filled = report.filled;
        result.fields_skipped = report.skipped;
        result.errors.extend(report.errors.iter().cloned());
        result.fields = report.outcomes.clone();
        log.push(
            "fill",
            format!(
                "{} filled, {} skipped, {} errors",
                report.filled,
                report.skipped,
                report.errors.len()
            ),
        );
        if report.is_blocked() {
            return Err(FormError::RequiredFieldFailed(report.blocking.join("; ")));
        }

        self.checkpoint(page, "filled", result).await;

        let validation = self.validator.validate(page, mappings.iter()).await;
        result.errors.extend(validation.errors.iter().cloned());
        result.warnings.extend(validation.warnings.iter().cloned());
        log.push(
            "validate",
            format!(
                "{} errors, {} warnings",
                validation.errors.len(),
                validation.warnings.len()
            ),
        );

        if !self.config.run.submit {
            info!(job = result.index, "dry run, not submitting");
            result.success = validation.valid;
            return Ok(());
        }

        let pre_html = self
            .checkpoint(page, "before_submit", result)
            .await
            .unwrap_or_default();
        let pre_hash = content_hash(&pre_html);
        let pre_url = page.current_url().await.ok();

        match submit_form(
            page,
            strategy.submit_selectors(),
            &descriptors,
            session.element_timeout(),
        )
        .await
        {
            Ok(method) => {
                log.push("submit", format!("{:?}", method));
                result.submit_method = Some(method);
                result.submitted_at = Some(Utc::now());
            }
            Err(e) => {
                result.errors.push(format!("submit: {}", e));
                log.push("submit_failed", e.to_string());
                result.success = false;
                return Ok(());
            }
        }

        // From here on the application is out: errors are recorded, never
        // returned, so the batch runner cannot submit it a second time.
        tokio::time::sleep(session.settle_delay()).await;
        match self.verifier.assess(page, &pre_hash, pre_url.as_deref()).await {
            Ok(verdict) => {
                log.push("verify", format!("{:?}", verdict.outcome));
                result.success = verdict.success;
                result.submission = Some(verdict);
            }
            Err(e) => {
                warn!(job = result.index, "could not verify submission: {}", e);
                log.push("verify_failed", e.to_string());
                result.errors.push(format!("verify: {}", e));
                result.success = false;
            }
        }
        self.checkpoint(page, "after_submit", result).await;
        Ok(())
    }

    async fn build_mappings<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        site: &str,
        descriptors: &[ElementDescriptor],
        strategy: Strategy,
        html: Option<&str>,
        classifier: &mut LlmClassifier,
        log: &mut ActionLog,
    ) -> MappingSet {
        let heuristic = self.heuristics.map(descriptors, self.profile);
        let mut set: MappingSet = heuristic.mappings.into_iter().collect();
        log.push(
            "map",
            format!("{} heuristic, {} unmapped", set.len(), heuristic.unmapped.len()),
        );

        if classifier.is_enabled() && !heuristic.unmapped.is_empty() {
            let context = PromptContext {
                page_excerpt: html
                    .map(|h| page_excerpt(h, self.config.llm.max_excerpt_chars))
                    .unwrap_or_default(),
                profile_paths: self.profile.leaf_paths(),
            };
            for descriptor in &heuristic.unmapped {
                let Some(classification) = classifier.classify(site, descriptor, &context).await else {
                    continue;
                };
                if classification.confidence < self.config.llm.min_confidence {
                    debug!(
                        field = %descriptor.field_key(),
                        confidence = classification.confidence,
                        "classification below confidence threshold"
                    );
                    continue;
                }
                let Some(mapping) = classification.to_mapping(descriptor) else {
                    continue;
                };
                if let Some(mapping) = visible_target(page, descriptors, mapping).await {
                    log.push("classify", format!("{} -> {}", descriptor.field_key(), mapping.locator));
                    set.insert(mapping);
                }
            }
        }

        for manual in strategy.manual_mappings(self.profile) {
            if let Some(manual) = visible_target(page, descriptors, manual).await {
                set.insert(manual);
            }
        }
        set
    }

    /// Screenshot, HTML and text for `name`. Returns the captured HTML.
    async fn checkpoint<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        name: &str,
        result: &mut JobResult,
    ) -> Option<String> {
        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                warn!(checkpoint = name, "could not read page content: {}", e);
                return None;
            }
        };
        let screenshot = match page.screenshot().await {
            Ok(png) => Some(png),
            Err(e) => {
                warn!(checkpoint = name, "screenshot failed: {}", e);
                None
            }
        };

        let artifact = Artifact::Checkpoint {
            name,
            screenshot: screenshot.as_deref(),
            html: &html,
        };
        match self.recorder.record(result.index, artifact).await {
            Ok(paths) => {
                for path in paths {
                    let shown = path.display().to_string();
                    match path.extension().and_then(|e| e.to_str()) {
                        Some("png") => result.screenshot_path = Some(shown),
                        Some("html") => result.html_snapshot_paths.push(shown),
                        _ => {}
                    }
                }
            }
            Err(e) => warn!(checkpoint = name, "could not record checkpoint: {}", e),
        }
        Some(html)
    }
}

/// Runs a list of URLs one after another, each in a freshly launched browser.
pub struct BatchRunner<'a, B, F>
where
    B: BrowserTrait,
    F: Fn() -> B,
{
    config: &'a Config,
    profile: &'a ProfileData,
    recorder: ArtifactRecorder,
    new_browser: F,
}

impl<'a, B, F> BatchRunner<'a, B, F>
where
    B: BrowserTrait,
    F: Fn() -> B,
{
    pub fn new(config: &'a Config, profile: &'a ProfileData, new_browser: F) -> Self {
        Self {
            config,
            profile,
            recorder: ArtifactRecorder::new(config.run.output_dir.clone()),
            new_browser,
        }
    }

    pub fn recorder(&self) -> &ArtifactRecorder {
        &self.recorder
    }

    /// Processes every URL in order and returns the summary rebuilt from the
    /// output directory. One failing job never stops the batch.
    pub async fn run(&self, urls: &[String], classifier: &mut LlmClassifier) -> Result<RunSummary> {
        info!("starting batch of {} jobs", urls.len());
        for (i, url) in urls.iter().enumerate() {
            let index = i + 1;
            let result = self.run_job(index, url, classifier).await;
            info!(
                job = index,
                success = result.success,
                filled = result.fields_filled,
                "job finished"
            );
            if index < urls.len() {
                tokio::time::sleep(self.config.session.inter_job_delay()).await;
            }
        }

        if let Err(e) = classifier.flush() {
            warn!("could not persist mapping cache: {}", e);
        }
        summarize(self.recorder.root()).await
    }

    /// Retries only when an attempt fails at job level; a completed run with
    /// an unconfirmed submission is final.
    pub async fn run_job(&self, index: usize, url: &str, classifier: &mut LlmClassifier) -> JobResult {
        let max_attempts = self.config.session.max_job_attempts.max(1);
        let mut log = ActionLog::new();
        let mut attempt = 0;

        let mut result = loop {
            attempt += 1;
            let mut result = JobResult::new(index, url);
            result.attempts = attempt;
            log.push("attempt", format!("{} of {}", attempt, max_attempts));

            match self.attempt(&mut result, classifier, &mut log).await {
                Ok(()) => break result,
                Err(e) => {
                    error!(job = index, attempt, "job failed: {}", e);
                    result.success = false;
                    result.errors.push(e.to_string());
                    if attempt >= max_attempts || result.submitted_at.is_some() {
                        break result;
                    }
                    tokio::time::sleep(self.config.session.settle_delay()).await;
                }
            }
        };

        result.finished_at = Some(Utc::now());
        if let Err(e) = self.recorder.record(index, Artifact::Result(&result)).await {
            warn!(job = index, "could not record result: {}", e);
        }
        if let Err(e) = self.recorder.record(index, Artifact::Actions(&log)).await {
            warn!(job = index, "could not record action log: {}", e);
        }
        result
    }

    async fn attempt(
        &self,
        result: &mut JobResult,
        classifier: &mut LlmClassifier,
        log: &mut ActionLog,
    ) -> Result<()> {
        let mut browser = (self.new_browser)();
        if let Err(e) = browser.launch(self.config).await {
            self.capture_error::<B::Page>(None, result, &e).await;
            return Err(e);
        }
        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                self.capture_error::<B::Page>(None, result, &e).await;
                let _ = browser.close().await;
                return Err(e);
            }
        };

        let runner = JobRunner::new(self.config, self.profile, &self.recorder);
        let outcome = runner.process(&page, classifier, result, log).await;
        if let Err(e) = &outcome {
            self.capture_error(Some(&page), result, e).await;
        }

        if let Err(e) = page.close().await {
            debug!("page close failed: {}", e);
        }
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {}", e);
        }
        outcome
    }

    async fn capture_error<P: PageDriver>(&self, page: Option<&P>, result: &JobResult, err: &FormError) {
        let (screenshot, html) = match page {
            Some(page) => (page.screenshot().await.ok(), page.content().await.ok()),
            None => (None, None),
        };
        let report = ErrorReport {
            url: result.url.clone(),
            message: err.to_string(),
            attempt: result.attempts,
            at: Utc::now(),
        };
        let artifact = Artifact::Error {
            report: &report,
            screenshot: screenshot.as_deref(),
            html: html.as_deref(),
        };
        if let Err(e) = self.recorder.record(result.index, artifact).await {
            warn!(job = result.index, "could not record error bundle: {}", e);
        }
    }
}

/// Canonical locator of whatever `selector` resolves to, or `None`.
async fn canonical_selector<P: PageDriver + ?Sized>(page: &P, selector: &str) -> Option<String> {
    let state = page
        .query(&PageQuery::FieldState {
            selector: selector.to_string(),
        })
        .await
        .ok()?;
    state
        .get("selector")
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

/// Keeps a manual or classifier mapping only when it lands on an element the
/// inspector reported as visible. CSS locators are rewritten to the
/// inspector's selector so they replace heuristic mappings for that element.
async fn visible_target<P: PageDriver + ?Sized>(
    page: &P,
    descriptors: &[ElementDescriptor],
    mut mapping: FieldMapping,
) -> Option<FieldMapping> {
    let on_visible = match mapping.locator.clone() {
        Locator::Css(selector) => {
            let Some(canonical) = canonical_selector(page, &selector).await else {
                debug!(selector = %selector, "mapping target not on page");
                return None;
            };
            let hit = descriptors
                .iter()
                .any(|d| d.visible && d.selector == canonical);
            if hit {
                mapping.locator = Locator::css(canonical);
            }
            hit
        }
        Locator::Point { x, y } => descriptors
            .iter()
            .any(|d| d.visible && d.bounding_box.contains(x, y)),
        Locator::Position(_) => true,
    };
    if !on_visible {
        warn!(
            field = %mapping.field_name,
            locator = %mapping.locator,
            source = ?mapping.source,
            "dropping mapping that targets no visible element"
        );
        return None;
    }
    Some(mapping)
}

fn coverage(descriptors: &[ElementDescriptor], mappings: &MappingSet) -> f64 {
    let fillable = descriptors.iter().filter(|d| d.is_fillable()).count();
    if fillable == 0 {
        return 0.0;
    }
    let covered = mappings.iter().filter(|m| m.has_value_source()).count();
    (covered.min(fillable) as f64 / fillable as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::RawElement;
    use crate::fill::FillStatus;
    use crate::testing::{MockBrowser, MockPage};
    use crate::verify::SubmissionOutcome;
    use serde_json::json;
    use std::path::Path;

    fn config(out: &Path, submit: bool) -> Config {
        let mut config = Config::default();
        config.session.settle_delay_ms = 0;
        config.session.inter_field_delay_ms = 0;
        config.session.inter_job_delay_ms = 0;
        config.session.element_timeout_ms = 10;
        config.run.output_dir = out.to_path_buf();
        config.run.submit = submit;
        config
    }

    fn profile() -> ProfileData {
        ProfileData::from_value(json!({
            "personal": {"firstName": "Anna", "lastName": "Kowalska"},
            "contact": {"email": "anna@example.com"},
        }))
    }

    fn application_page() -> MockPage {
        let mut email = RawElement::input("email");
        email.input_type = "email".into();
        email.required = true;
        MockPage::new()
            .with_element(RawElement::input("firstname"))
            .with_element(RawElement::input("lastname"))
            .with_element(email)
    }

    async fn process(page: &MockPage, config: &Config) -> (JobResult, Result<()>) {
        let profile = profile();
        let recorder = ArtifactRecorder::new(config.run.output_dir.clone());
        let runner = JobRunner::new(config, &profile, &recorder);
        let mut result = JobResult::new(1, "http://localhost:8080/apply");
        let mut log = ActionLog::new();
        let outcome = runner
            .process(page, &mut LlmClassifier::disabled(), &mut result, &mut log)
            .await;
        (result, outcome)
    }

    #[tokio::test]
    async fn test_dry_run_fills_without_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let page = application_page();

        let (result, outcome) = process(&page, &config).await;

        outcome.unwrap();
        assert!(result.success);
        assert_eq!(result.fields_filled, 3);
        assert_eq!(result.coverage, 100.0);
        assert!(!page.was_submitted());
        assert_eq!(page.value_of("email").as_deref(), Some("anna@example.com"));
        assert!(result
            .fields
            .iter()
            .all(|f| f.status == FillStatus::Filled));
        let job_dir = dir.path().join("001");
        assert!(job_dir.join("mapping.json").is_file());
        assert!(job_dir.join("initial.html").is_file());
        assert!(job_dir.join("filled.png").is_file());
    }

    #[tokio::test]
    async fn test_submission_is_verified() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), true);
        let page = application_page()
            .with_button("#send", "Bewerbung absenden")
            .with_success_text("Vielen Dank für Ihre Bewerbung!");

        let (result, outcome) = process(&page, &config).await;

        outcome.unwrap();
        assert!(page.was_submitted());
        assert!(result.success);
        assert!(result.submitted_at.is_some());
        assert!(matches!(
            result.submission.as_ref().map(|v| &v.outcome),
            Some(SubmissionOutcome::Confirmed { .. })
        ));
        assert!(dir.path().join("001").join("after_submit.txt").is_file());
    }

    #[tokio::test]
    async fn test_page_without_fields_is_a_job_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let (_, outcome) = process(&MockPage::new(), &config).await;
        assert!(matches!(outcome, Err(FormError::NoFormFields(_))));
    }

    #[tokio::test]
    async fn test_batch_retries_job_level_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let profile = profile();
        let page = MockPage::new().with_navigation_error("net::ERR_NAME_NOT_RESOLVED");
        let batch = BatchRunner::new(&config, &profile, || MockBrowser::new(page.clone()));

        let summary = batch
            .run(
                &["https://unreachable.example/job".to_string()],
                &mut LlmClassifier::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 1);
        let job = &summary.jobs[0];
        assert!(job.error_details.is_some());
        assert!(job.page_html.is_some());
        assert!(page.is_closed());

        let data: JobResult =
            serde_json::from_slice(&std::fs::read(dir.path().join("001/data.json")).unwrap()).unwrap();
        assert_eq!(data.attempts, 2);
        assert!(data.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_verification_failure_after_submit_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), true);
        let profile = profile();
        let page = application_page()
            .with_button("#send", "Absenden")
            .with_content_error_after_submit();
        let batch = BatchRunner::new(&config, &profile, || MockBrowser::new(page.clone()));

        let result = batch
            .run_job(1, "http://localhost:8080/apply", &mut LlmClassifier::disabled())
            .await;

        assert!(page.was_submitted());
        assert_eq!(page.clicks().iter().filter(|c| c.as_str() == "#send").count(), 1);
        assert_eq!(result.attempts, 1);
        assert!(!result.success);
        assert!(result.submitted_at.is_some());
        assert!(result.errors.iter().any(|e| e.starts_with("verify:")));
    }

    #[tokio::test]
    async fn test_launch_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), false);
        config.session.max_job_attempts = 1;
        let profile = profile();
        let batch = BatchRunner::new(&config, &profile, || MockBrowser::failing(MockPage::new()));

        let result = batch
            .run_job(4, "http://localhost/apply", &mut LlmClassifier::disabled())
            .await;

        assert!(!result.success);
        assert!(result.errors[0].contains("Browser launch failed"));
        assert!(dir.path().join("004/error.json").is_file());
        assert!(dir.path().join("004/actions.json").is_file());
    }

    fn hidden_input(name: &str, input_type: &str) -> RawElement {
        let mut raw = RawElement::input(name);
        raw.input_type = input_type.into();
        raw.display = "none".into();
        raw
    }

    struct CannedClient(String);

    #[async_trait::async_trait]
    impl crate::mapping::LlmClient for CannedClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn canned(reply: &str) -> LlmClassifier {
        LlmClassifier::new(
            Some(Box::new(CannedClient(reply.to_string()))),
            Box::new(crate::mapping::MemoryCache::new()),
            500,
        )
    }

    #[tokio::test]
    async fn test_manual_mapping_skips_hidden_honeypot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let mut email = RawElement::input("email");
        email.input_type = "email".into();
        let page = MockPage::new()
            .with_element(hidden_input("email_confirm_hp", "email"))
            .with_element(RawElement::input("firstname"))
            .with_element(email);

        let (result, outcome) = process(&page, &config).await;

        outcome.unwrap();
        assert_eq!(result.strategy, Strategy::LocalMock);
        assert_eq!(page.value_of("email_confirm_hp").as_deref(), Some(""));
        assert_eq!(page.value_of("email").as_deref(), Some("anna@example.com"));
        assert!(result
            .mappings
            .iter()
            .all(|m| m.locator != Locator::css("input[name=\"email_confirm_hp\"]")));
    }

    #[tokio::test]
    async fn test_classifier_targets_must_be_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let profile = profile();
        let recorder = ArtifactRecorder::new(config.run.output_dir.clone());
        let runner = JobRunner::new(&config, &profile, &recorder);
        let page = MockPage::new()
            .with_element(RawElement::input("q17_answer"))
            .with_element(hidden_input("q17_trap", "text"));

        let mut classifier = canned(
            r##"{"strategy":"selector","selector":"input[name=\"q17_trap\"]","action":"fill","fieldPath":"personal.firstName","confidence":0.9}"##,
        );
        let mut result = JobResult::new(1, "https://jobs.example.com/apply");
        runner
            .process(&page, &mut classifier, &mut result, &mut ActionLog::new())
            .await
            .unwrap();
        assert_eq!(page.value_of("q17_trap").as_deref(), Some(""));
        assert!(result.mappings.is_empty());

        let mut classifier = canned(
            r#"{"strategy":"coordinate_click","x":5000,"y":5000,"action":"click","confidence":0.9}"#,
        );
        let mut result = JobResult::new(2, "https://jobs.example.com/apply");
        runner
            .process(&page, &mut classifier, &mut result, &mut ActionLog::new())
            .await
            .unwrap();
        assert!(result.mappings.is_empty());

        let mut classifier = canned(
            r#"{"strategy":"selector","selector":"input[name=\"q17_answer\"]","action":"fill","fieldPath":"personal.firstName","confidence":0.9}"#,
        );
        let mut result = JobResult::new(3, "https://jobs.example.com/apply");
        runner
            .process(&page, &mut classifier, &mut result, &mut ActionLog::new())
            .await
            .unwrap();
        assert_eq!(page.value_of("q17_answer").as_deref(), Some("Anna"));
    }

    #[test]
    fn test_markdown_lists_errors() {
        let mut result = JobResult::new(7, "https://jobs.example.com/1");
        result.errors.push("#x ('Anna'): Element not found: #x".into());
        let md = result.to_markdown();
        assert!(md.starts_with("# Job 007"));
        assert!(md.contains("## Errors"));
        assert!(md.contains("- **Result:** failure"));
    }
}
