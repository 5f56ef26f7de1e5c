//! Batch pipeline integration tests
//!
//! Drive the orchestrator against a real SQLite ledger with scripted
//! recognizers.

mod helpers;

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use helpers::{count_rows, create_test_db, png_bytes, FaultyLedger, ScriptedRecognizer};
use imageleuth_ai::db::{details, sessions, SessionLedger, SqliteLedger};
use imageleuth_ai::models::{BatchStatus, RecognitionStatus};
use imageleuth_ai::services::{
    BatchError, BatchOrchestrator, BatchRequest, RecognitionInvoker, Recognizer, UploadedImage,
};

fn orchestrator(
    ledger: Arc<dyn SessionLedger>,
    recognizer: Arc<dyn Recognizer>,
    root: &Path,
) -> BatchOrchestrator {
    BatchOrchestrator::new(
        ledger,
        RecognitionInvoker::new(recognizer),
        root.join("temp"),
        root.join("output"),
    )
}

fn upload(name: &str, bytes: Vec<u8>) -> UploadedImage {
    UploadedImage {
        original_name: name.to_string(),
        bytes,
    }
}

fn request(uploads: Vec<UploadedImage>, display_names: &[&str]) -> BatchRequest {
    BatchRequest {
        uploads,
        display_names: display_names.iter().map(|s| s.to_string()).collect(),
        client_origin: "192.0.2.10".to_string(),
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_mixed_batch_counts_every_item_once() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![
        Ok(helpers::SUCCESS_REPLY),
        Err("connection reset"),
        Ok("I could not read this receipt"),
        Ok(r#"{"code": 400, "data": {}}"#),
    ]));
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        recognizer.clone(),
        db_dir.path(),
    );

    let uploads = vec![
        upload("a.png", png_bytes()),
        upload("corrupt.jpg", b"\xff\xd8 not really a jpeg".to_vec()),
        upload("b.png", png_bytes()),
        upload("c.png", png_bytes()),
        upload("d.png", png_bytes()),
        upload("e.png", png_bytes()),
    ];

    let outcome = orchestrator.run(request(uploads, &[]), None).await.unwrap();

    // the corrupt image never reaches the recognizer
    assert_eq!(recognizer.calls(), 5);

    assert_eq!(outcome.total_count(), 6);
    assert_eq!(outcome.processed_count(), 2);
    assert_eq!(
        outcome.totals.success_files + outcome.totals.failed_files,
        outcome.totals.total_files
    );

    let statuses: Vec<_> = outcome.records.iter().map(|r| r.recognition_status).collect();
    assert_eq!(
        statuses,
        vec![
            RecognitionStatus::Success,
            RecognitionStatus::Failed,
            RecognitionStatus::Failed,
            RecognitionStatus::Failed,
            RecognitionStatus::Failed,
            RecognitionStatus::Success,
        ]
    );
    assert!(outcome.records[1].error_message.as_deref().unwrap().starts_with("图片处理失败"));
    assert!(outcome.records[2].error_message.as_deref().unwrap().starts_with("AI识别失败"));
    assert!(outcome.records[3].error_message.as_deref().unwrap().starts_with("结果解析失败"));
    assert_eq!(outcome.records[4].error_message.as_deref(), Some("AI识别返回失败代码"));

    let session = sessions::load_session(&pool, outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, BatchStatus::Done);
    assert_eq!(session.totals, outcome.totals);
    assert_eq!(session.client_origin, "192.0.2.10");
    assert!(session.finished_at.is_some());

    let rows = details::list_details(&pool, outcome.session_id).await.unwrap();
    assert_eq!(rows.len(), 6);
    let row_names: Vec<_> = rows.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(row_names, vec!["a.png", "corrupt.jpg", "b.png", "c.png", "d.png", "e.png"]);
    assert_eq!(rows[0].amount.as_deref(), Some("117.17"));
    assert_eq!(rows[0].payment_channel, "微信");
    assert_eq!(rows[0].replay().unwrap(), outcome.records[0]);
}

#[tokio::test]
async fn test_empty_batch_is_rejected_before_any_side_effect() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );

    let result = orchestrator.run(request(Vec::new(), &["x.jpg"]), None).await;

    assert!(matches!(result, Err(BatchError::EmptyBatch)));
    assert_eq!(count_rows(&pool, "expense_ocr_session").await, 0);
    assert!(!db_dir.path().join("temp").exists());
}

#[tokio::test]
async fn test_ledger_failure_finalizes_session_as_error() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let ledger = FaultyLedger::new(SqliteLedger::new(pool.clone()), 2);
    let orchestrator = orchestrator(
        Arc::new(ledger),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );

    let uploads = (1..=4)
        .map(|i| upload(&format!("r{}.png", i), png_bytes()))
        .collect();

    let err = orchestrator.run(request(uploads, &[]), None).await.unwrap_err();

    let (session_id, message, partial) = match err {
        BatchError::Pipeline {
            session_id,
            message,
            partial,
        } => (session_id.unwrap(), message, partial.unwrap()),
        other => panic!("unexpected error: {:?}", other),
    };
    assert!(message.contains("r3.png"), "message: {}", message);
    assert_eq!(partial.records.len(), 2);

    let session = sessions::load_session(&pool, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, BatchStatus::Error);
    assert_eq!(session.totals.total_files, 2);
    assert_eq!(session.totals.success_files, 2);
    assert_eq!(session.totals.failed_files, 0);
    assert_eq!(session.error_message.as_deref(), Some(message.as_str()));

    // details written before the failure are kept
    assert_eq!(details::list_details(&pool, session_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_display_names_are_index_aligned() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );

    let uploads = vec![
        upload("IMG_0001.png", png_bytes()),
        upload("IMG_0002.png", png_bytes()),
        upload("my receipt.png", png_bytes()),
    ];

    // one name missing, one blank
    let outcome = orchestrator
        .run(request(uploads, &["出差_01.png", "  "]), None)
        .await
        .unwrap();

    let names: Vec<_> = outcome.records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["出差_01.png", "IMG_0002.png", "my receipt.png"]);
    assert_eq!(
        file_names(outcome.workspace.path()),
        vec!["IMG_0002.png", "my receipt.png", "出差_01.png"]
    );
}

#[tokio::test]
async fn test_rerun_replaces_previous_batch() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );

    let first = orchestrator
        .run(
            request(vec![upload("a.png", png_bytes()), upload("b.png", png_bytes())], &[]),
            None,
        )
        .await
        .unwrap();
    let first_path = first.workspace.path().to_path_buf();

    let output = db_dir.path().join("output");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("old_expense_report.xlsx"), b"old").unwrap();

    let second = orchestrator
        .run(request(vec![upload("c.png", png_bytes())], &[]), Some(first.workspace))
        .await
        .unwrap();

    assert!(!first_path.exists());
    assert_ne!(second.workspace.path(), first_path.as_path());
    assert_eq!(file_names(second.workspace.path()), vec!["c.png"]);
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.total_count(), 1);
    assert!(file_names(&output).is_empty());

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(count_rows(&pool, "expense_ocr_session").await, 2);
    assert_eq!(count_rows(&pool, "expense_ocr_detail").await, 3);
}

#[tokio::test]
async fn test_every_item_failing_still_completes() {
    let temp = TempDir::new().unwrap();
    let (_db_dir, pool) = create_test_db().await.unwrap();
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(ScriptedRecognizer::new(vec![Err("timeout"), Err("timeout")])),
        temp.path(),
    );

    let outcome = orchestrator
        .run(
            request(vec![upload("a.png", png_bytes()), upload("b.png", png_bytes())], &[]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.processed_count(), 0);
    assert_eq!(outcome.totals.failed_files, 2);

    let session = sessions::load_session(&pool, outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, BatchStatus::Done);
}

#[tokio::test]
async fn test_workspace_store_failure_aborts_and_keeps_earlier_details() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let recognizer = Arc::new(ScriptedRecognizer::always_succeeds());
    let orchestrator = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        recognizer.clone(),
        db_dir.path(),
    );

    // longer than any file system's name limit, so the second store fails
    let unstorable = format!("{}.png", "x".repeat(300));
    let uploads = vec![
        upload("a.png", png_bytes()),
        upload("b.png", png_bytes()),
        upload("c.png", png_bytes()),
    ];

    let err = orchestrator
        .run(request(uploads, &["", unstorable.as_str()]), None)
        .await
        .unwrap_err();

    let (session_id, message, partial) = match err {
        BatchError::Pipeline {
            session_id,
            message,
            partial,
        } => (session_id.unwrap(), message, partial.unwrap()),
        other => panic!("unexpected error: {:?}", other),
    };
    assert!(message.starts_with("Failed to store"), "message: {}", message);

    // the loop stopped before recognizing the unstorable item
    assert_eq!(recognizer.calls(), 1);
    assert_eq!(partial.records.len(), 1);
    assert_eq!(partial.records[0].file_name, "a.png");
    assert_eq!(file_names(partial.workspace.path()), vec!["a.png"]);

    let session = sessions::load_session(&pool, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, BatchStatus::Error);
    assert_eq!(session.totals.total_files, 1);
    assert_eq!(session.totals.success_files, 1);
    assert_eq!(session.error_message.as_deref(), Some(message.as_str()));

    let rows = details::list_details(&pool, session_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_name, "a.png");
}

#[tokio::test]
async fn test_workspace_creation_failure_finalizes_empty_error_session() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let recognizer = Arc::new(ScriptedRecognizer::always_succeeds());

    // a plain file where the temp root directory should be
    let blocked = db_dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let orchestrator = BatchOrchestrator::new(
        Arc::new(SqliteLedger::new(pool.clone())),
        RecognitionInvoker::new(recognizer.clone()),
        blocked,
        db_dir.path().join("output"),
    );

    let err = orchestrator
        .run(request(vec![upload("a.png", png_bytes())], &[]), None)
        .await
        .unwrap_err();

    let session_id = err.session_id().unwrap();
    match err {
        BatchError::Pipeline { message, partial, .. } => {
            assert!(message.starts_with("Failed to create batch workspace"));
            assert!(partial.is_none());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(recognizer.calls(), 0);

    let session = sessions::load_session(&pool, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, BatchStatus::Error);
    assert_eq!(session.totals.total_files, 0);
    assert_eq!(count_rows(&pool, "expense_ocr_detail").await, 0);
}

#[tokio::test]
async fn test_open_failure_still_discards_previous_workspace() {
    let (db_dir, pool) = create_test_db().await.unwrap();

    let healthy = orchestrator(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );
    let first = healthy
        .run(request(vec![upload("a.png", png_bytes())], &[]), None)
        .await
        .unwrap();
    let first_path = first.workspace.path().to_path_buf();
    assert!(first_path.is_dir());

    let broken = orchestrator(
        Arc::new(FaultyLedger::healthy(SqliteLedger::new(pool.clone())).failing_open()),
        Arc::new(ScriptedRecognizer::always_succeeds()),
        db_dir.path(),
    );
    let err = broken
        .run(request(vec![upload("b.png", png_bytes())], &[]), Some(first.workspace))
        .await
        .unwrap_err();

    assert_eq!(err.session_id(), None);
    assert!(!first_path.exists());
    assert_eq!(count_rows(&pool, "expense_ocr_session").await, 1);
}

#[tokio::test]
async fn test_finalize_failure_leaves_session_as_error() {
    let (db_dir, pool) = create_test_db().await.unwrap();
    let ledger = FaultyLedger::healthy(SqliteLedger::new(pool.clone())).failing_closes(1);
    let orchestrator = orchestrator(
        Arc::new(ledger),
        Arc::new(ScriptedRecognizer::new(vec![Ok(helpers::SUCCESS_REPLY), Err("timeout")])),
        db_dir.path(),
    );

    let err = orchestrator
        .run(
            request(vec![upload("a.png", png_bytes()), upload("b.png", png_bytes())], &[]),
            None,
        )
        .await
        .unwrap_err();

    let (session_id, message, partial) = match err {
        BatchError::Pipeline {
            session_id,
            message,
            partial,
        } => (session_id.unwrap(), message, partial.unwrap()),
        other => panic!("unexpected error: {:?}", other),
    };
    assert!(message.starts_with("Failed to finalize batch session"));
    assert_eq!(partial.records.len(), 2);

    let session = sessions::load_session(&pool, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, BatchStatus::Error);
    assert_eq!(session.totals.total_files, 2);
    assert_eq!(session.totals.success_files, 1);
    assert_eq!(session.totals.failed_files, 1);
    assert!(session.finished_at.is_some());
}
