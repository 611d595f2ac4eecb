mod common;

use common::{encoded, engine_with, png, solid, test_config, texture, write_png, Gate, GatedProvider};
use logomatch_engine::{ComparisonStrategy, ImageSource, MatchEngine, RuntimeState};

async fn ready_engine(strategy: ComparisonStrategy) -> MatchEngine {
    let mut config = test_config();
    config.strategy = strategy;
    let engine = engine_with(GatedProvider::preloaded(), config);
    engine.ensure_ready().await.unwrap();
    engine
}

#[tokio::test]
async fn identical_images_match() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let image = texture(160, 160, 11);

    let results = engine
        .compare_against_all(&encoded("frame", &image), &[encoded("logo", &image)])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.source_image, "logo");
    assert_eq!(result.captured_image, "frame");
    assert!(result.similarity_score >= 0.8, "score {}", result.similarity_score);
    assert!(result.is_match);
    assert!(result.good_matches > 0);
    assert_eq!(
        result.summary,
        format!(
            "Similarity: {:.2}% ({} matches)",
            result.similarity_score * 100.0,
            result.good_matches
        )
    );
    let overlay = result.overlay.as_ref().unwrap();
    assert_eq!(&overlay[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn featureless_image_scores_zero() {
    let engine = ready_engine(ComparisonStrategy::Features).await;

    let results = engine
        .compare_against_all(&encoded("frame", &texture(160, 160, 11)), &[encoded("blank", &solid(120, 90, 128))])
        .await
        .unwrap();

    let result = &results[0];
    assert_eq!(result.similarity_score, 0.0);
    assert!(!result.is_match);
    assert_eq!(result.good_matches, 0);
    assert_eq!(result.summary, "Similarity: 0.00% (no features detected)");
}

#[tokio::test]
async fn different_textures_do_not_match() {
    let engine = ready_engine(ComparisonStrategy::Features).await;

    let results = engine
        .compare_against_all(&encoded("frame", &texture(160, 160, 11)), &[encoded("other", &texture(160, 160, 99))])
        .await
        .unwrap();

    assert!(results[0].similarity_score < 0.8);
    assert!(!results[0].is_match);
}

#[tokio::test]
async fn failed_items_fall_back_in_order() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let dir = tempfile::tempdir().unwrap();
    let captured = texture(160, 160, 21);
    let on_disk = write_png(dir.path(), "same.png", &captured);

    let references = vec![
        encoded("unrelated", &texture(140, 120, 4)),
        ImageSource::encoded("corrupt", vec![0x89, b'P', b'N', b'G', 0, 0]),
        ImageSource::path(dir.path().join("missing.png")),
        ImageSource::path(&on_disk),
    ];
    let results = engine.compare_against_all(&encoded("frame", &captured), &references).await.unwrap();

    assert_eq!(results.len(), references.len());
    for (result, reference) in results.iter().zip(&references) {
        assert_eq!(result.source_image, reference.identity());
        assert_eq!(result.captured_image, "frame");
    }
    for fallback in &results[1..3] {
        assert!(fallback.summary.starts_with("Comparison impossible: "), "{}", fallback.summary);
        assert_eq!(fallback.similarity_score, 0.0);
        assert!(!fallback.is_match);
        assert!(fallback.overlay.is_none());
    }
    assert!(results[3].is_match);

    let stats = engine.ledger().stats();
    assert!(stats.allocated > 0);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn unreadable_captured_image_falls_back_for_every_reference() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let references = vec![
        encoded("logo", &texture(64, 64, 1)),
        ImageSource::path("/no/such/ref.png"),
        encoded("other", &texture(80, 80, 2)),
        encoded("blank", &solid(40, 40, 9)),
    ];

    let results = engine
        .compare_against_all(&ImageSource::path("/no/such/frame.jpg"), &references)
        .await
        .unwrap();

    assert_eq!(results.len(), references.len());
    for (result, reference) in results.iter().zip(&references) {
        assert_eq!(result.source_image, reference.identity());
        assert_eq!(result.captured_image, "/no/such/frame.jpg");
        assert_eq!(result.similarity_score, 0.0);
        assert!(!result.is_match);
        assert!(result.summary.starts_with("Comparison impossible: could not read /no/such/frame.jpg"));
    }
    assert_eq!(engine.ledger().live(), 0);

    let template = engine
        .compare_with_template(&ImageSource::path("/no/such/frame.jpg"))
        .await
        .unwrap();
    assert!(template.summary.starts_with("Comparison impossible: "));
}

#[tokio::test]
async fn empty_reference_list() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let results = engine
        .compare_against_all(&encoded("frame", &texture(64, 64, 1)), &[])
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn cancelled_batch_releases_handles() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let captured = encoded("frame", &texture(160, 160, 31));
    let references: Vec<_> = (0..6).map(|i| encoded(&format!("ref-{i}"), &texture(160, 160, i))).collect();

    let mut finished = false;
    tokio::select! {
        biased;
        _ = engine.compare_against_all(&captured, &references) => finished = true,
        _ = std::future::ready(()) => {}
    }

    assert!(!finished);
    let stats = engine.ledger().stats();
    assert!(stats.allocated > 0);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn template_comparison() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    // same seed and size as the template built by `engine_with`
    let result = engine
        .compare_with_template(&encoded("frame", &texture(160, 160, 7)))
        .await
        .unwrap();
    assert_eq!(result.source_image, "template");
    assert!(result.is_match, "{}", result.summary);

    let fallback = engine
        .compare_with_template(&ImageSource::encoded("garbage", vec![1, 2, 3]))
        .await
        .unwrap();
    assert!(fallback.summary.starts_with("Comparison impossible: "));
    assert_eq!(engine.ledger().live(), 0);
}

#[tokio::test]
async fn extract_after_ready() {
    let engine = ready_engine(ComparisonStrategy::Features).await;
    let features = engine.extract(&png(&texture(160, 160, 2))).unwrap();
    assert!(!features.is_empty());
    assert_eq!(features.keypoints().len(), features.descriptors().len());
    assert!(engine.extract(&png(&solid(64, 64, 0))).unwrap().is_empty());
}

#[tokio::test]
async fn embedding_strategy() {
    let engine = ready_engine(ComparisonStrategy::Embedding).await;
    let image = texture(120, 120, 8);

    let results = engine
        .compare_against_all(
            &encoded("frame", &image),
            &[
                encoded("same", &image),
                ImageSource::encoded("corrupt", vec![0u8; 3]),
                encoded("blank", &solid(50, 50, 0)),
            ],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!((results[0].similarity_score - 1.0).abs() < 1e-6);
    assert!(results[0].is_match);
    assert_eq!(results[0].good_matches, 0);
    assert!(results[0].overlay.is_none());
    assert_eq!(results[0].summary, "Embedding similarity: 1.0000 (match)");

    assert!(results[1].summary.starts_with("Comparison impossible: "));

    // an all-black image has no magnitude
    assert_eq!(results[2].similarity_score, 0.0);
    assert_eq!(results[2].summary, "Embedding similarity: 0.0000 (no match)");
    assert!(engine.embedding().is_ready());
}

#[tokio::test]
async fn embedding_strategy_does_not_wait_for_vision_runtime() {
    let mut config = test_config();
    config.strategy = ComparisonStrategy::Embedding;
    let engine = engine_with(GatedProvider::new(Gate::Never), config);
    let image = texture(96, 96, 4);

    let results = engine
        .compare_against_all(&encoded("frame", &image), &[encoded("same", &image)])
        .await
        .unwrap();

    assert_eq!(engine.state(), RuntimeState::Uninitialized);
    assert!(results[0].is_match, "{}", results[0].summary);
    assert!(engine.embedding().is_ready());
}

#[tokio::test]
async fn blank_template_scores_zero() {
    let engine = MatchEngine::builder()
        .config(test_config())
        .provider(GatedProvider::preloaded())
        .template(encoded("blank-template", &solid(100, 100, 255)))
        .build()
        .unwrap();
    engine.ensure_ready().await.unwrap();
    assert!(engine.template().unwrap().is_empty());

    let result = engine
        .compare_with_template(&encoded("frame", &texture(160, 160, 12)))
        .await
        .unwrap();
    assert_eq!(result.similarity_score, 0.0);
    assert!(!result.is_match);
    assert_eq!(result.summary, "Similarity: 0.00% (no features detected)");
    assert_eq!(engine.ledger().live(), 0);
}
