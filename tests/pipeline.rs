//! End-to-end pipeline behavior against in-memory collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use coach_rag::error::IngestError;
use coach_rag::ingest::{IngestOptions, Ingestor, UploadOutcome};
use coach_rag::youtube_ingest::{VideoOutcome, YoutubeOutcome, YoutubeRequest};
use coach_rag_core::models::{AccessTier, ProcessStatus};
use coach_rag_core::store::Store;
use coach_rag_core::youtube_url::canonical_video_url;

use common::*;

fn created(outcome: UploadOutcome) -> coach_rag::ingest::IngestSummary {
    match outcome {
        UploadOutcome::Created(summary) => summary,
        UploadOutcome::Duplicate(existing) => panic!("unexpected duplicate of {}", existing.id),
    }
}

#[tokio::test]
async fn test_upload_creates_chunks_and_grants() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));

    let summary = created(
        ing.ingest_file(
            text_upload("keto-basics.txt", &long_text()),
            &[coach("carnivore", AccessTier::Pro)],
        )
        .await
        .unwrap(),
    );

    assert_eq!(summary.title, "keto-basics");
    assert_eq!(summary.chunks_created, 4);
    assert_eq!(summary.total_chunks, 4);
    assert_eq!(summary.status, ProcessStatus::Completed);
    assert_eq!(summary.version, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.access.len(), 1);
    assert!(summary.access[0].success);
    assert_eq!(summary.access[0].granted, 4);
    assert_eq!(store.inner.grant_count(), 4);

    let chunks = store.list_chunks(&summary.source_id).await.unwrap();
    let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(chunks[0].title, "keto-basics - Part 1/4");
    assert_eq!(chunks[3].metadata.offset, 2400);
    assert_eq!(chunks[3].metadata.char_length, 100);
    assert!(chunks.iter().all(|c| c.is_active && c.version == 1 && c.total_chunks == 4));

    let source = store.get_source(&summary.source_id).await.unwrap().unwrap();
    assert_eq!(source.metadata.process_status, ProcessStatus::Completed);
    assert_eq!(source.metadata.chunks_created, Some(4));
    assert_eq!(source.metadata.mime_type.as_deref(), Some("text/plain"));
    assert_eq!(source.metadata.char_count, Some(2500));
    assert!(source.metadata.processed_at.is_some());
}

#[tokio::test]
async fn test_reupload_is_duplicate_and_writes_nothing() {
    let store = Arc::new(FlakyStore::new());
    let embedder = Arc::new(ScriptedEmbedder::ok());
    let ing = ingestor(store.clone(), embedder.clone(), Arc::new(FakeVideos::new()));
    let coaches = [coach("carnivore", AccessTier::Pro)];

    let first = created(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches)
            .await
            .unwrap(),
    );
    let calls_after_first = embedder.calls();

    // Same bytes under a different name are still the same content.
    let second = ing
        .ingest_file(text_upload("renamed.txt", &long_text()), &coaches)
        .await
        .unwrap();
    match second {
        UploadOutcome::Duplicate(existing) => {
            assert_eq!(existing.id, first.source_id);
            assert_eq!(existing.title, "a");
            assert_eq!(existing.chunk_count, 4);
        }
        UploadOutcome::Created(_) => panic!("expected duplicate"),
    }

    assert_eq!(store.inner.source_count(), 1);
    assert_eq!(store.inner.chunk_count(), 4);
    assert_eq!(store.inner.grant_count(), 4);
    assert_eq!(embedder.calls(), calls_after_first);
}

#[tokio::test]
async fn test_reupload_after_deactivation_reuses_source_with_next_version() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));
    let coaches = [coach("carnivore", AccessTier::Free)];

    let first = created(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches)
            .await
            .unwrap(),
    );
    assert_eq!(store.deactivate_chunks(&first.source_id).await.unwrap(), 4);

    let second = created(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches)
            .await
            .unwrap(),
    );
    assert_eq!(second.source_id, first.source_id);
    assert_eq!(second.version, 2);
    assert_eq!(store.inner.source_count(), 1);
    assert_eq!(store.inner.chunk_count(), 8);
    assert_eq!(store.count_active_chunks(&first.source_id).await.unwrap(), 4);

    let active_versions: Vec<u32> = store
        .list_chunks(&first.source_id)
        .await
        .unwrap()
        .iter()
        .filter(|c| c.is_active)
        .map(|c| c.version)
        .collect();
    assert_eq!(active_versions, vec![2, 2, 2, 2]);
}

#[tokio::test]
async fn test_partial_embedding_failure_keeps_other_chunks() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(
        store.clone(),
        Arc::new(ScriptedEmbedder::failing_on("BOOM")),
        Arc::new(FakeVideos::new()),
    );

    let summary = created(
        ing.ingest_file(
            text_upload("a.txt", &long_text_with_marker("BOOM")),
            &[coach("carnivore", AccessTier::Premium)],
        )
        .await
        .unwrap(),
    );

    assert_eq!(summary.status, ProcessStatus::Partial);
    assert_eq!(summary.chunks_created, 3);
    assert_eq!(summary.total_chunks, 4);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].chunk_index, 2);
    assert!(summary.errors[0].error.contains("503"));

    let chunks = store.list_chunks(&summary.source_id).await.unwrap();
    let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 3]);
    assert!(chunks.iter().all(|c| c.total_chunks == 4));
    assert_eq!(store.inner.grant_count(), 3);

    let source = store.get_source(&summary.source_id).await.unwrap().unwrap();
    assert_eq!(source.metadata.process_status, ProcessStatus::Partial);
    assert_eq!(source.metadata.errors.len(), 1);
}

#[tokio::test]
async fn test_access_failure_for_one_coach_does_not_affect_others() {
    let store = Arc::new(FlakyStore::new());
    store.fail_grants_for("keto");
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));

    let summary = created(
        ing.ingest_file(
            text_upload("a.txt", &long_text()),
            &[
                coach("carnivore", AccessTier::Pro),
                coach("keto", AccessTier::Free),
                coach("vegan", AccessTier::Premium),
            ],
        )
        .await
        .unwrap(),
    );

    let outcomes: Vec<(&str, bool)> = summary
        .access
        .iter()
        .map(|a| (a.coach_id.as_str(), a.success))
        .collect();
    assert_eq!(
        outcomes,
        vec![("carnivore", true), ("keto", false), ("vegan", true)]
    );
    assert_eq!(summary.access[1].granted, 0);
    assert!(summary.access[1].error.is_some());
    // Access failures never change the ingestion status.
    assert_eq!(summary.status, ProcessStatus::Completed);
    assert_eq!(store.inner.grant_count(), 8);
}

#[tokio::test]
async fn test_empty_coach_access_is_rejected_before_any_work() {
    let store = Arc::new(FlakyStore::new());
    let embedder = Arc::new(ScriptedEmbedder::ok());
    let videos = Arc::new(FakeVideos::new().with_video("dQw4w9WgXcQ", "Video", Some("words")));
    let ing = ingestor(store.clone(), embedder.clone(), videos.clone());

    let err = ing
        .ingest_file(text_upload("a.txt", &long_text()), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    let request = YoutubeRequest {
        video_id: Some("dQw4w9WgXcQ".to_string()),
        ..Default::default()
    };
    let err = ing.process_youtube(&request, &[]).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    assert_eq!(store.inner.source_count(), 0);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(videos.transcript_calls(), 0);
}

#[tokio::test]
async fn test_empty_and_oversized_files_are_rejected() {
    let store = Arc::new(FlakyStore::new());
    let ing = Ingestor::new(
        store.clone(),
        Arc::new(ScriptedEmbedder::ok()),
        Arc::new(FakeVideos::new()),
        IngestOptions {
            max_file_bytes: 100,
            ..Default::default()
        },
    );
    let coaches = [coach("carnivore", AccessTier::Pro)];

    let err = ing
        .ingest_file(text_upload("empty.txt", ""), &coaches)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    let err = ing
        .ingest_file(text_upload("big.txt", &long_text()), &coaches)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    let err = ing
        .ingest_file(text_upload("blank.txt", "   \n\t "), &coaches)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no_extractable_text");

    let mut image = text_upload("photo.png", "not really a png");
    image.mime_type = Some("image/png".to_string());
    let err = ing.ingest_file(image, &coaches).await.unwrap_err();
    assert_eq!(err.code(), "unsupported_content_type");

    assert_eq!(store.inner.source_count(), 0);
}

#[tokio::test]
async fn test_concurrent_insert_conflict_reports_duplicate() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));
    let coaches = [coach("carnivore", AccessTier::Pro)];

    let winner = created(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches)
            .await
            .unwrap(),
    );

    // The loser's pre-check runs before the winner's row is visible.
    store.hidden_lookups.store(1, Ordering::SeqCst);
    let loser = ing
        .ingest_file(text_upload("a.txt", &long_text()), &coaches)
        .await
        .unwrap();

    match loser {
        UploadOutcome::Duplicate(existing) => {
            assert_eq!(existing.id, winner.source_id);
            assert_eq!(existing.chunk_count, 4);
        }
        UploadOutcome::Created(_) => panic!("conflict must surface as a duplicate"),
    }
    assert_eq!(store.inner.source_count(), 1);
    assert_eq!(store.inner.chunk_count(), 4);
}

#[tokio::test]
async fn test_chunk_insert_failure_marks_source_failed_and_skips_access() {
    let store = Arc::new(FlakyStore::new());
    store.fail_chunk_insert.store(true, Ordering::SeqCst);
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));

    let err = ing
        .ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Pro)],
        )
        .await
        .unwrap_err();

    let source_id = match &err {
        IngestError::Persistence { source_id, message } => {
            assert!(message.contains("disk I/O error"));
            source_id.clone().unwrap()
        }
        other => panic!("expected persistence error, got {:?}", other),
    };

    let source = store.get_source(&source_id).await.unwrap().unwrap();
    assert_eq!(source.metadata.process_status, ProcessStatus::Failed);
    assert!(source.metadata.error.is_some());
    assert_eq!(store.inner.chunk_count(), 0);
    assert_eq!(store.inner.grant_count(), 0);

    // A failed source has no active chunks, so the retry reuses it.
    store.fail_chunk_insert.store(false, Ordering::SeqCst);
    let retry = created(
        ing.ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Pro)],
        )
        .await
        .unwrap(),
    );
    assert_eq!(retry.source_id, source_id);
    assert_eq!(retry.version, 1);
}

#[tokio::test]
async fn test_all_chunks_failing_marks_source_failed() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(
        store.clone(),
        Arc::new(ScriptedEmbedder::always_failing()),
        Arc::new(FakeVideos::new()),
    );

    let err = ing
        .ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Pro)],
        )
        .await
        .unwrap_err();

    let source_id = match err {
        IngestError::NoChunksEmbedded { source_id, errors } => {
            assert_eq!(errors.len(), 4);
            source_id
        }
        other => panic!("expected NoChunksEmbedded, got {:?}", other),
    };
    let source = store.get_source(&source_id).await.unwrap().unwrap();
    assert_eq!(source.metadata.process_status, ProcessStatus::Failed);
    assert_eq!(source.metadata.chunks_created, Some(0));
    assert_eq!(source.metadata.total_chunks, Some(4));
    assert_eq!(store.inner.grant_count(), 0);
}

#[tokio::test]
async fn test_concurrent_reingest_of_reusable_source_yields_one_winner() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(
        store.clone(),
        Arc::new(ScriptedEmbedder::with_delay(Duration::from_millis(50))),
        Arc::new(FakeVideos::new()),
    );
    let coaches = [coach("carnivore", AccessTier::Pro)];

    let first = created(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches)
            .await
            .unwrap(),
    );
    store.deactivate_chunks(&first.source_id).await.unwrap();

    let (a, b) = tokio::join!(
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches),
        ing.ingest_file(text_upload("a.txt", &long_text()), &coaches),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let winners: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            UploadOutcome::Created(summary) => Some(summary),
            UploadOutcome::Duplicate(_) => None,
        })
        .collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].version, 2);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        UploadOutcome::Duplicate(existing) if existing.id == first.source_id
    )));

    let source = store.get_source(&first.source_id).await.unwrap().unwrap();
    assert_eq!(source.metadata.process_status, ProcessStatus::Completed);
    assert_eq!(store.count_active_chunks(&first.source_id).await.unwrap(), 4);
    assert_eq!(store.inner.chunk_count(), 8);
}

#[tokio::test]
async fn test_status_write_failure_still_reports_committed_chunks() {
    let store = Arc::new(FlakyStore::new());
    store.fail_metadata_updates.store(true, Ordering::SeqCst);
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(FakeVideos::new()));

    let summary = created(
        ing.ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Free)],
        )
        .await
        .unwrap(),
    );
    assert_eq!(summary.status, ProcessStatus::Completed);
    assert_eq!(summary.chunks_created, 4);
    assert_eq!(store.inner.grant_count(), 4);

    // Active chunks keep the content deduplicated even without the status.
    assert!(matches!(
        ing.ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Free)],
        )
        .await
        .unwrap(),
        UploadOutcome::Duplicate(_)
    ));
}

#[tokio::test]
async fn test_repeated_coach_is_rejected_before_any_work() {
    let store = Arc::new(FlakyStore::new());
    let embedder = Arc::new(ScriptedEmbedder::ok());
    let ing = ingestor(store.clone(), embedder.clone(), Arc::new(FakeVideos::new()));

    let err = ing
        .ingest_file(
            text_upload("a.txt", &long_text()),
            &[
                coach("carnivore", AccessTier::Free),
                coach("carnivore", AccessTier::Premium),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert!(err.to_string().contains("carnivore"));
    assert_eq!(store.inner.source_count(), 0);
    assert_eq!(embedder.calls(), 0);

    let err = ing
        .process_youtube(
            &YoutubeRequest {
                video_id: Some(VIDEO_OK.to_string()),
                ..Default::default()
            },
            &[coach("keto", AccessTier::Free), coach("keto", AccessTier::Free)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn test_embedding_concurrency_is_bounded() {
    let embedder = Arc::new(ScriptedEmbedder::with_delay(Duration::from_millis(20)));
    let ing = Ingestor::new(
        Arc::new(FlakyStore::new()),
        embedder.clone(),
        Arc::new(FakeVideos::new()),
        IngestOptions {
            chunk_size: 100,
            chunk_overlap: 0,
            max_concurrency: 3,
            ..Default::default()
        },
    );

    let summary = created(
        ing.ingest_file(
            text_upload("a.txt", &long_text()),
            &[coach("carnivore", AccessTier::Pro)],
        )
        .await
        .unwrap(),
    );
    assert_eq!(summary.chunks_created, 25);
    assert_eq!(embedder.calls(), 25);
    assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 3);
}

// ============ YouTube ============

const VIDEO_OK: &str = "aaaaaaaaaaa";
const VIDEO_NO_TRANSCRIPT: &str = "bbbbbbbbbbb";
const VIDEO_REMOVED: &str = "ccccccccccc";
const VIDEO_SEEN: &str = "ddddddddddd";

fn playlist_videos() -> FakeVideos {
    FakeVideos::new()
        .with_video(VIDEO_OK, "Fasting 101", Some(&transcript_text("fasting")))
        .with_video(VIDEO_NO_TRANSCRIPT, "Live Q&A", None)
        .with_video(VIDEO_SEEN, "Protein myths", Some(&transcript_text("protein")))
        .with_playlist(
            "PLcoach",
            &[VIDEO_OK, VIDEO_NO_TRANSCRIPT, VIDEO_REMOVED, VIDEO_SEEN],
        )
        .with_playlist("PLempty", &[])
}

#[tokio::test]
async fn test_playlist_failures_are_isolated_per_video() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(playlist_videos()));
    let coaches = [coach("keto", AccessTier::Premium)];

    // Ingest one playlist video up front so it comes back as a duplicate.
    let single = YoutubeRequest {
        video_id: Some(VIDEO_SEEN.to_string()),
        ..Default::default()
    };
    ing.process_youtube(&single, &coaches).await.unwrap();

    let request = YoutubeRequest {
        playlist_id: Some("PLcoach".to_string()),
        ..Default::default()
    };
    let (videos, summary) = match ing.process_youtube(&request, &coaches).await.unwrap() {
        YoutubeOutcome::Processed { videos, summary } => (videos, summary),
        YoutubeOutcome::Duplicate(_) => panic!("playlists never collapse to a duplicate"),
    };

    assert_eq!(summary.total, 4);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.duplicates, 1);

    let order: Vec<&str> = videos.iter().map(|v| v.video_id()).collect();
    assert_eq!(
        order,
        vec![VIDEO_OK, VIDEO_NO_TRANSCRIPT, VIDEO_REMOVED, VIDEO_SEEN]
    );
    assert!(matches!(videos[0], VideoOutcome::Ingested { .. }));
    match &videos[1] {
        VideoOutcome::Failed { title, error, .. } => {
            assert_eq!(title.as_deref(), Some("Live Q&A"));
            assert!(error.contains("no transcript"));
        }
        other => panic!("unexpected {:?}", other),
    }
    match &videos[2] {
        VideoOutcome::Failed { error, .. } => assert!(error.contains("removed")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(videos[3], VideoOutcome::Duplicate { .. }));

    let source = store
        .find_source_by_url(&canonical_video_url(VIDEO_OK))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.metadata.playlist_id.as_deref(), Some("PLcoach"));
    assert_eq!(source.metadata.video_id.as_deref(), Some(VIDEO_OK));
    assert_eq!(source.title, "Fasting 101");
}

#[tokio::test]
async fn test_single_video_duplicate_skips_transcript_fetch() {
    let store = Arc::new(FlakyStore::new());
    let videos = Arc::new(playlist_videos());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), videos.clone());
    let coaches = [coach("keto", AccessTier::Free)];

    let request = YoutubeRequest {
        url: Some(format!("https://youtu.be/{}?t=30", VIDEO_OK)),
        ..Default::default()
    };
    let first = ing.process_youtube(&request, &coaches).await.unwrap();
    let source_id = match first {
        YoutubeOutcome::Processed { videos, summary } => {
            assert_eq!(summary.successful, 1);
            match &videos[0] {
                VideoOutcome::Ingested { source_id, chunks_created, .. } => {
                    assert!(*chunks_created >= 2);
                    source_id.clone()
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        YoutubeOutcome::Duplicate(_) => panic!("first request cannot be a duplicate"),
    };
    assert_eq!(videos.transcript_calls(), 1);

    // Different URL shape, same canonical video.
    let again = YoutubeRequest {
        url: Some(format!("https://www.youtube.com/watch?v={}", VIDEO_OK)),
        ..Default::default()
    };
    match ing.process_youtube(&again, &coaches).await.unwrap() {
        YoutubeOutcome::Duplicate(existing) => {
            assert_eq!(existing.id, source_id);
            assert_eq!(existing.title, "Fasting 101");
        }
        YoutubeOutcome::Processed { .. } => panic!("expected duplicate"),
    }
    assert_eq!(videos.transcript_calls(), 1);

    let status = ing.video_status(VIDEO_OK).await.unwrap();
    assert!(status.exists);
    assert!(status.is_duplicate);
    assert_eq!(status.source_url, canonical_video_url(VIDEO_OK));
}

#[tokio::test]
async fn test_empty_playlist_reports_zero_videos() {
    let ing = ingestor(
        Arc::new(FlakyStore::new()),
        Arc::new(ScriptedEmbedder::ok()),
        Arc::new(playlist_videos()),
    );
    let request = YoutubeRequest {
        playlist_id: Some("PLempty".to_string()),
        ..Default::default()
    };
    match ing
        .process_youtube(&request, &[coach("keto", AccessTier::Free)])
        .await
        .unwrap()
    {
        YoutubeOutcome::Processed { videos, summary } => {
            assert!(videos.is_empty());
            assert_eq!(summary.total, 0);
        }
        YoutubeOutcome::Duplicate(_) => panic!("unexpected duplicate"),
    }
}

#[tokio::test]
async fn test_playlist_lookup_failure_is_upstream_error() {
    let mut videos = playlist_videos();
    videos.fail_playlists = true;
    let ing = ingestor(
        Arc::new(FlakyStore::new()),
        Arc::new(ScriptedEmbedder::ok()),
        Arc::new(videos),
    );
    let request = YoutubeRequest {
        url: Some("https://www.youtube.com/playlist?list=PLcoach".to_string()),
        ..Default::default()
    };
    let err = ing
        .process_youtube(&request, &[coach("keto", AccessTier::Free)])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Upstream(_)));
    assert_eq!(err.code(), "upstream_error");
}

#[tokio::test]
async fn test_video_embedding_failure_is_recorded_per_video() {
    let ing = ingestor(
        Arc::new(FlakyStore::new()),
        Arc::new(ScriptedEmbedder::always_failing()),
        Arc::new(playlist_videos()),
    );
    let request = YoutubeRequest {
        video_id: Some(VIDEO_OK.to_string()),
        ..Default::default()
    };
    match ing
        .process_youtube(&request, &[coach("keto", AccessTier::Free)])
        .await
        .unwrap()
    {
        YoutubeOutcome::Processed { videos, summary } => {
            assert_eq!(summary.failed, 1);
            let result = videos[0].to_result();
            assert!(!result.success);
            assert!(result.error.unwrap().contains("no chunks could be embedded"));
        }
        YoutubeOutcome::Duplicate(_) => panic!("unexpected duplicate"),
    }
}

#[tokio::test]
async fn test_upload_never_matches_a_video_transcript() {
    let store = Arc::new(FlakyStore::new());
    let ing = ingestor(store.clone(), Arc::new(ScriptedEmbedder::ok()), Arc::new(playlist_videos()));
    let coaches = [coach("keto", AccessTier::Free)];

    let request = YoutubeRequest {
        video_id: Some(VIDEO_OK.to_string()),
        ..Default::default()
    };
    assert!(matches!(
        ing.process_youtube(&request, &coaches).await.unwrap(),
        YoutubeOutcome::Processed { .. }
    ));
    let video = ing.video_status(VIDEO_OK).await.unwrap();
    let video_source = video.document.unwrap().id;

    // Same bytes as the stored transcript.
    let upload = || text_upload("fasting.txt", &transcript_text("fasting"));
    let doc = created(ing.ingest_file(upload(), &coaches).await.unwrap());
    assert_ne!(doc.source_id, video_source);

    // With the video's chunks gone the upload still cannot claim its row.
    store.deactivate_chunks(&video_source).await.unwrap();
    store.deactivate_chunks(&doc.source_id).await.unwrap();
    let again = created(ing.ingest_file(upload(), &coaches).await.unwrap());
    assert_eq!(again.source_id, doc.source_id);

    let video_row = store.get_source(&video_source).await.unwrap().unwrap();
    assert_eq!(video_row.source_url.as_deref(), Some(canonical_video_url(VIDEO_OK).as_str()));
    assert!(ing.video_status(VIDEO_OK).await.unwrap().exists);
}
