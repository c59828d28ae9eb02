use formpilot::artifacts::{ActionLog, ArtifactRecorder};
use formpilot::dom::{ElementInspector, RawElement};
use formpilot::fill::FillExecutor;
use formpilot::job::{JobResult, JobRunner};
use formpilot::mapping::{Document, HeuristicMapper, LlmClassifier, MemoryCache, OllamaClient};
use formpilot::testing::MockPage;
use formpilot::verify::{content_hash, SubmissionVerifier};
use formpilot::{Config, PageDriver, ProfileData};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio_test::assert_ok;

fn quick_config(out: &Path, submit: bool) -> Config {
    let mut config = Config::default();
    config.session.settle_delay_ms = 0;
    config.session.inter_field_delay_ms = 0;
    config.session.element_timeout_ms = 10;
    config.run.output_dir = out.to_path_buf();
    config.run.submit = submit;
    config
}

fn anna() -> ProfileData {
    ProfileData::from_value(json!({
        "personal": {"firstName": "Anna", "lastName": "Kowalska"},
        "contact": {"email": "a@x.com"},
    }))
}

#[tokio::test]
async fn scenario_a_profile_values_land_in_named_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), true);
    let profile = anna();
    let recorder = ArtifactRecorder::new(dir.path());
    let page = MockPage::new()
        .with_element(RawElement::input("firstname"))
        .with_element(RawElement::input("lastname"))
        .with_element(RawElement::input("email"))
        .with_success_text("Thank you for your application");

    let mut result = JobResult::new(1, "https://jobs.example.com/apply");
    let runner = JobRunner::new(&config, &profile, &recorder);
    assert_ok!(
        runner
            .process(&page, &mut LlmClassifier::disabled(), &mut result, &mut ActionLog::new())
            .await
    );

    assert_eq!(page.value_of("firstname").as_deref(), Some("Anna"));
    assert_eq!(page.value_of("lastname").as_deref(), Some("Kowalska"));
    assert_eq!(page.value_of("email").as_deref(), Some("a@x.com"));
    assert_eq!(result.fields_filled, 3);
    assert!(result.success);
}

#[tokio::test]
async fn scenario_b_resume_resolves_or_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let resume = dir.path().join("resume.pdf");
    std::fs::write(&resume, b"%PDF-1.4").unwrap();

    let mut cv = RawElement::input("cv");
    cv.input_type = "file".into();
    let page = MockPage::new().with_element(cv);
    let descriptors = ElementInspector::new().inspect(&page).await;
    let executor = FillExecutor::new(Duration::from_millis(10), Duration::ZERO);
    let profile = ProfileData::from_value(json!({}));

    let with_resume = HeuristicMapper::new().map(&descriptors, &vec![Document::new(&resume)]);
    let cv_mapping = &with_resume.mappings[0];
    assert_eq!(
        cv_mapping.resolve_value(&profile).as_deref(),
        resume.to_str()
    );
    let report = executor.fill(&page, &with_resume.mappings, &profile).await;
    assert_eq!(report.filled, 1);
    assert_eq!(page.uploaded("cv"), vec![resume.clone()]);

    let without = HeuristicMapper::new().map(&descriptors, &Vec::<Document>::new());
    let report = executor.fill(&page, &without.mappings, &profile).await;
    assert_eq!(report.skipped, 1);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn scenario_c_unreachable_classifier_lowers_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), false);
    let profile = anna();
    let recorder = ArtifactRecorder::new(dir.path());
    let page = MockPage::new()
        .with_element(RawElement::input("firstname"))
        .with_element(RawElement::input("q17_answer"));

    let client = OllamaClient::new("http://127.0.0.1:9", "mistral", 0.1, Duration::from_secs(2)).unwrap();
    let mut classifier = LlmClassifier::new(Some(Box::new(client)), Box::new(MemoryCache::new()), 500);
    let mut result = JobResult::new(1, "https://jobs.example.com/apply");
    let runner = JobRunner::new(&config, &profile, &recorder);

    assert_ok!(
        runner
            .process(&page, &mut classifier, &mut result, &mut ActionLog::new())
            .await
    );

    assert_eq!(classifier.calls(), 1);
    assert_eq!(result.coverage, 50.0);
    assert_eq!(page.value_of("firstname").as_deref(), Some("Anna"));
    assert_eq!(page.value_of("q17_answer").as_deref(), Some(""));
}

#[tokio::test]
async fn scenario_d_german_thanks_confirms_submission() {
    let page = MockPage::new()
        .with_element(RawElement::input("email"))
        .with_success_text("Vielen Dank für Ihre Bewerbung!");
    let before = content_hash(&page.content().await.unwrap());

    page.click("input[name=\"email\"]").await.unwrap();
    assert!(!SubmissionVerifier::default().verify(&page, &before).await.unwrap());

    page.query(&formpilot::PageQuery::SubmitFirstForm).await.unwrap();
    assert!(SubmissionVerifier::default().verify(&page, &before).await.unwrap());
}
