//! Capture pipeline integration tests

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::Notify;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use lector::gemini::GeminiClient;
use lector::recognition::GeminiRecognizer;
use lector::{
    Error, FailureKind, FallbackReason, LanguageTable, Orchestrator, Outcome, RecognitionResult,
    Stage,
};

mod common;
use common::{
    FakeRecognizer, FakeSynthesizer, Harness, ODD_PAYLOAD, RecordingAnnouncer, RecordingOutput,
    VALID_PAYLOAD, capture,
};

/// Wait until a gated capture is inside recognition
async fn wait_for_recognition(harness: &Harness) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.recognizer.calls() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn no_text_skips_synthesis_and_announces_message() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::new(
        FakeRecognizer::returning(RecognitionResult::NoTextFound),
        FakeSynthesizer::returning(Some(VALID_PAYLOAD)),
        RecordingOutput::new(),
    );

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::RecognitionNoText,
            message: en.no_text.clone(),
        }
    );
    assert_eq!(harness.synthesizer.calls(), 0);
    assert!(harness.output.played().is_empty());
    assert_eq!(harness.announcer.texts(), [en.no_text.clone()]);

    let session = harness.orchestrator.snapshot().await;
    assert_eq!(session.last_error.as_deref(), Some(en.no_text.as_str()));
    assert_eq!(session.stage, Stage::Idle);
    assert!(!session.in_progress);
}

#[tokio::test]
async fn whitespace_text_counts_as_no_text() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("   ", Some(VALID_PAYLOAD));

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert!(matches!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::RecognitionNoText,
            ..
        }
    ));
    assert_eq!(harness.synthesizer.calls(), 0);
}

#[tokio::test]
async fn recognition_error_announces_localized_message() {
    let languages = LanguageTable::builtin();
    let es = languages.resolve("es");
    let harness = Harness::new(
        FakeRecognizer::returning(RecognitionResult::ApiError("503".to_string())),
        FakeSynthesizer::returning(None),
        RecordingOutput::new(),
    );

    let outcome = harness.orchestrator.process_image(capture(), es).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::RecognitionApiError,
            message: es.recognition_failed.clone(),
        }
    );
    assert_eq!(harness.synthesizer.calls(), 0);
    let spoken = harness.announcer.spoken();
    assert_eq!(spoken.last().unwrap(), &(es.recognition_failed.clone(), "es-ES".to_string()));
}

#[tokio::test]
async fn absent_payload_announces_exact_text() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("Hello", None);

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Announced {
            reason: FallbackReason::SynthesisUnavailable
        }
    );
    assert!(harness.output.played().is_empty());
    assert_eq!(
        harness.announcer.spoken(),
        [("Hello".to_string(), "en-US".to_string())]
    );
}

#[tokio::test]
async fn synthesis_error_falls_back_to_announcing() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::new(
        FakeRecognizer::text("Hello"),
        FakeSynthesizer::failing(),
        RecordingOutput::new(),
    );

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Announced {
            reason: FallbackReason::SynthesisUnavailable
        }
    );
    assert_eq!(harness.announcer.texts(), ["Hello"]);
}

#[tokio::test]
async fn valid_payload_is_decoded_and_played() {
    let languages = LanguageTable::builtin();
    let fr = languages.resolve("fr");
    let harness = Harness::with("Bonjour", Some(VALID_PAYLOAD));

    let outcome = harness.orchestrator.process_image(capture(), fr).await.unwrap();

    assert_eq!(outcome, Outcome::Played);
    assert_eq!(harness.output.played(), [vec![0.0, -1.0]]);
    assert!(harness.announcer.spoken().is_empty());
    assert_eq!(harness.synthesizer.languages(), ["fr"]);

    let session = harness.orchestrator.snapshot().await;
    assert_eq!(session.text.as_deref(), Some("Bonjour"));
    assert!(session.has_audio);
    assert_eq!(session.language.as_deref(), Some("fr"));
}

#[tokio::test]
async fn undecodable_payload_announces_text() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("Hello", Some(ODD_PAYLOAD));

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Announced {
            reason: FallbackReason::DecodeFailed
        }
    );
    assert!(harness.output.played().is_empty());
    assert_eq!(harness.announcer.texts(), ["Hello"]);
}

#[tokio::test]
async fn playback_failure_announces_text() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::new(
        FakeRecognizer::text("Hello"),
        FakeSynthesizer::returning(Some(VALID_PAYLOAD)),
        RecordingOutput::failing(),
    );

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Announced {
            reason: FallbackReason::PlaybackFailed
        }
    );
    assert_eq!(harness.announcer.texts(), ["Hello"]);
}

#[tokio::test]
async fn processing_notice_is_shown_not_spoken() {
    let languages = LanguageTable::builtin();
    let de = languages.resolve("de").clone();
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        FakeRecognizer::gated("Hallo", gate.clone()),
        FakeSynthesizer::returning(Some(VALID_PAYLOAD)),
        RecordingOutput::new(),
    );

    let orchestrator = harness.orchestrator.clone();
    let profile = de.clone();
    let capture_task =
        tokio::spawn(async move { orchestrator.process_image(capture(), &profile).await });
    wait_for_recognition(&harness).await;

    let during = harness.orchestrator.snapshot().await;
    assert_eq!(during.notice.as_deref(), Some(de.processing.as_str()));
    assert!(harness.announcer.spoken().is_empty());

    gate.notify_one();
    assert_eq!(capture_task.await.unwrap().unwrap(), Outcome::Played);

    assert!(harness.orchestrator.snapshot().await.notice.is_none());
    assert!(harness.announcer.spoken().is_empty());
}

#[tokio::test]
async fn dropped_capture_still_runs_to_completion() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        FakeRecognizer::gated("Hello", gate.clone()),
        FakeSynthesizer::returning(Some(VALID_PAYLOAD)),
        RecordingOutput::new(),
    );

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        harness.orchestrator.process_image(capture(), en),
    )
    .await;
    assert!(dropped.is_err());

    // Still running; the session and the slot agree
    let snapshot = harness.orchestrator.snapshot().await;
    assert!(snapshot.in_progress);
    assert!(harness.orchestrator.is_busy());

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.orchestrator.is_busy() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let snapshot = harness.orchestrator.snapshot().await;
    assert!(!snapshot.in_progress);
    assert_eq!(snapshot.stage, Stage::Idle);
    assert_eq!(snapshot.text.as_deref(), Some("Hello"));
    assert!(snapshot.has_audio);
    assert_eq!(harness.output.played().len(), 1);
}

#[tokio::test]
async fn hung_recognition_times_out_and_frees_slot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "candidates": [{ "content": { "parts": [{ "text": "late" }] } }]
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let gemini = GeminiClient::new(SecretString::from("test-key".to_string()), server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(100));
    let synthesizer = FakeSynthesizer::returning(Some(VALID_PAYLOAD));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(GeminiRecognizer::new(gemini, "gemini-2.5-flash".to_string())),
        synthesizer.clone(),
        RecordingOutput::new(),
        RecordingAnnouncer::new(),
    ));

    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        orchestrator.process_image(capture(), en),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::RecognitionApiError,
            message: en.recognition_failed.clone(),
        }
    );
    assert!(!orchestrator.is_busy());
    assert_eq!(synthesizer.calls(), 0);
    assert!(orchestrator.replay().await.is_ok());
}

#[tokio::test]
async fn panic_becomes_generic_failure() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::new(
        FakeRecognizer::panicking(),
        FakeSynthesizer::returning(None),
        RecordingOutput::new(),
    );

    let outcome = harness.orchestrator.process_image(capture(), en).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::GenericFailure,
            message: en.generic_error.clone(),
        }
    );
    assert_eq!(harness.announcer.texts(), [en.generic_error.clone()]);

    // The slot is free again
    assert!(!harness.orchestrator.is_busy());
    let again = harness.orchestrator.process_image(capture(), en).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn replay_without_session_is_noop() {
    let harness = Harness::with("Hello", None);

    assert!(!harness.orchestrator.can_replay().await);
    assert!(!harness.orchestrator.replay().await.unwrap());
    assert!(harness.output.played().is_empty());
    assert!(harness.announcer.spoken().is_empty());
}

#[tokio::test]
async fn replay_plays_stored_audio() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("Hello", Some(VALID_PAYLOAD));

    harness.orchestrator.process_image(capture(), en).await.unwrap();
    assert!(harness.orchestrator.can_replay().await);
    assert!(harness.orchestrator.replay().await.unwrap());

    assert_eq!(harness.output.played().len(), 2);
    assert_eq!(harness.synthesizer.calls(), 1);
}

#[tokio::test]
async fn replay_announces_stored_text() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("Hello", None);

    harness.orchestrator.process_image(capture(), en).await.unwrap();
    assert!(harness.orchestrator.replay().await.unwrap());

    assert_eq!(harness.announcer.texts(), ["Hello", "Hello"]);
    assert_eq!(harness.recognizer.calls(), 1);
}

#[tokio::test]
async fn new_capture_resets_session() {
    let languages = LanguageTable::builtin();
    let en = languages.resolve("en");
    let harness = Harness::with("Hello", Some(VALID_PAYLOAD));

    harness.orchestrator.process_image(capture(), en).await.unwrap();
    assert!(harness.orchestrator.snapshot().await.has_audio);

    harness.recognizer.set(RecognitionResult::NoTextFound);
    harness.orchestrator.process_image(capture(), en).await.unwrap();

    let session = harness.orchestrator.snapshot().await;
    assert!(session.text.is_none());
    assert!(!session.has_audio);
    assert!(!session.can_replay);
    assert_eq!(session.last_error.as_deref(), Some(en.no_text.as_str()));
    assert!(!harness.orchestrator.replay().await.unwrap());
}

#[tokio::test]
async fn second_capture_is_rejected_while_first_in_flight() {
    let languages = LanguageTable::builtin();
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        FakeRecognizer::gated("Hello", gate.clone()),
        FakeSynthesizer::returning(None),
        RecordingOutput::new(),
    );

    let orchestrator = harness.orchestrator.clone();
    let en = languages.resolve("en").clone();
    let first = tokio::spawn(async move { orchestrator.process_image(capture(), &en).await });

    wait_for_recognition(&harness).await;

    assert!(harness.orchestrator.is_busy());
    let second = harness
        .orchestrator
        .process_image(capture(), languages.resolve("en"))
        .await;
    assert!(matches!(second, Err(Error::Busy)));
    assert!(matches!(harness.orchestrator.replay().await, Err(Error::Busy)));

    let snapshot = harness.orchestrator.snapshot().await;
    assert!(snapshot.in_progress);
    assert_eq!(snapshot.stage, Stage::Recognizing);

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Announced { .. }));
    assert_eq!(harness.recognizer.calls(), 1);
    assert!(!harness.orchestrator.is_busy());
}
