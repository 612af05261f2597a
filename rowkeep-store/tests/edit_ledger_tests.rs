//! Edit request ledger tests
//!
//! - Submission stages media under the staging or row prefix
//! - A failed upload leaves neither a request nor stray objects
//! - Listing filters and their pending-only fallbacks
//! - Rejection, change summary and CSV export

mod helpers;

use helpers::{ada, create_hub_with, create_test_hub, grace, ingest_shops, jpeg, FaultyObjectStore};
use rowkeep_store::models::{
    ConsentFlags, FieldChange, MediaKind, MediaUpload, RequestStatus, SubmissionMeta,
};
use rowkeep_store::StoreError;
use tokio_util::sync::CancellationToken;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_submit_new_row_stages_under_request_prefix() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;

    let meta = SubmissionMeta {
        consent: ConsentFlags { publish: true, contact: false },
        community_tags: strings(&["bakery", "family-run"]),
    };
    let permit = MediaUpload {
        filename: "permit".to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4".to_vec(),
        kind: MediaKind::Document,
        category: "permit".to_string(),
    };

    let record = t
        .hub
        .submit_edit_request(
            dataset.id,
            None,
            &[FieldChange::new("name", "", "Rye & Co"), FieldChange::new("city", "", "Hull")],
            &[jpeg("front.JPG", b"jpeg-bytes"), permit],
            &ada(),
            &meta,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let request = &record.request;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.row_id, None);
    assert!(!request.existing_row);
    assert_eq!(request.consent, ConsentFlags { publish: true, contact: false });
    assert_eq!(request.community_tags, strings(&["bakery", "family-run"]));
    assert_eq!(record.details.len(), 2);
    assert_eq!(record.change_count(), 2);

    let prefix = format!("{}_Ada_Lovelace/", request.id);
    assert_eq!(record.attachments.len(), 2);
    for attachment in &record.attachments {
        assert!(attachment.locator.starts_with(&prefix), "locator {}", attachment.locator);
        assert_eq!(attachment.bucket, helpers::BUCKET);
        assert_eq!(attachment.row_id, None);
    }
    assert!(record.attachments[0].locator.ends_with(".jpg"));
    assert!(record.attachments[1].locator.ends_with(".pdf"));
    assert_eq!(record.attachments[1].kind, MediaKind::Document);
    assert_eq!(record.attachments[1].category, "permit");

    assert_eq!(t.objects.keys_under(&prefix).await.len(), 2);
}

#[tokio::test]
async fn test_submit_existing_row_stages_under_row_prefix() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let row = t.hub.read_dataset_rows(dataset.id, 1).await.unwrap().remove(0);

    let record = t
        .hub
        .submit_edit_request(
            dataset.id,
            Some(row.id),
            &[FieldChange::new("hours", "9-5", "9-6")],
            &[jpeg("sign.png", b"png-bytes")],
            &grace(),
            &SubmissionMeta::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(record.request.existing_row);
    assert_eq!(record.request.row_id, Some(row.id));
    assert_eq!(record.details[0].row_id, Some(row.id));
    assert!(record.attachments[0].locator.starts_with(&format!("{}/", row.id)));
    assert_eq!(record.attachments[0].row_id, Some(row.id));
}

#[tokio::test]
async fn test_submit_validation() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let cancel = CancellationToken::new();
    let meta = SubmissionMeta::default();

    let no_changes = t.hub.submit_edit_request(dataset.id, None, &[], &[], &ada(), &meta, &cancel).await;
    assert!(matches!(no_changes, Err(StoreError::InvalidInput(_))));

    let blank_field = t
        .hub
        .submit_edit_request(dataset.id, None, &[FieldChange::new(" ", "", "x")], &[], &ada(), &meta, &cancel)
        .await;
    assert!(matches!(blank_field, Err(StoreError::InvalidInput(_))));

    let unknown_dataset = t
        .hub
        .submit_edit_request(404, None, &[FieldChange::new("name", "", "x")], &[], &ada(), &meta, &cancel)
        .await;
    assert!(matches!(unknown_dataset, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_upload_failure_leaves_nothing_behind() {
    // Given: the second put fails
    let t = create_hub_with(FaultyObjectStore::failing_put_after(1), None).await;
    let dataset = ingest_shops(&t.hub, "shops").await;

    // When: submitting with two photos
    let result = t
        .hub
        .submit_edit_request(
            dataset.id,
            None,
            &[FieldChange::new("name", "", "Rye & Co")],
            &[jpeg("a.jpg", b"a"), jpeg("b.jpg", b"b")],
            &ada(),
            &SubmissionMeta::default(),
            &CancellationToken::new(),
        )
        .await;

    // Then: Upload error, no request in any state, first object removed
    assert!(matches!(result, Err(StoreError::Upload(_))), "got {:?}", result);
    let all = strings(&["pending", "approved", "rejected"]);
    assert!(t.hub.list_edit_requests(Some(all.as_slice()), None).await.unwrap().is_empty());
    assert!(t.objects.keys().await.is_empty());

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM edit_request_details")
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_cancelled_upload_is_upload_error() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = t
        .hub
        .submit_edit_request(
            dataset.id,
            None,
            &[FieldChange::new("name", "", "Rye & Co")],
            &[jpeg("a.jpg", b"a")],
            &ada(),
            &SubmissionMeta::default(),
            &cancel,
        )
        .await;

    assert!(matches!(result, Err(StoreError::Upload(_))), "got {:?}", result);
    assert!(t.hub.list_edit_requests(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let cancel = CancellationToken::new();
    let meta = SubmissionMeta::default();
    let change = [FieldChange::new("name", "", "New Shop")];

    let a1 = t.hub.submit_edit_request(dataset.id, None, &change, &[], &ada(), &meta, &cancel).await.unwrap();
    let a2 = t.hub.submit_edit_request(dataset.id, None, &change, &[], &ada(), &meta, &cancel).await.unwrap();
    let g1 = t.hub.submit_edit_request(dataset.id, None, &change, &[], &grace(), &meta, &cancel).await.unwrap();
    t.hub.reject_edit_request(a2.request.id, "reviewer").await.unwrap();

    let ids = |records: Vec<rowkeep_store::models::EditRequestRecord>| {
        records.into_iter().map(|r| r.request.id).collect::<Vec<_>>()
    };

    // No filter: pending only, by id
    assert_eq!(ids(t.hub.list_edit_requests(None, None).await.unwrap()), vec![a1.request.id, g1.request.id]);

    // Status and submitter combined
    let rejected = strings(&["rejected"]);
    assert_eq!(
        ids(t.hub.list_edit_requests(Some(rejected.as_slice()), Some("u-ada")).await.unwrap()),
        vec![a2.request.id]
    );
    assert!(t.hub.list_edit_requests(Some(rejected.as_slice()), Some("u-grace")).await.unwrap().is_empty());

    let both = strings(&["pending", "rejected"]);
    assert_eq!(
        ids(t.hub.list_edit_requests(Some(both.as_slice()), Some("u-ada")).await.unwrap()),
        vec![a1.request.id, a2.request.id]
    );

    // Submitter alone or a bad status falls back to pending-only
    assert_eq!(
        ids(t.hub.list_edit_requests(None, Some("u-ada")).await.unwrap()),
        vec![a1.request.id, g1.request.id]
    );
    let bogus = strings(&["bogus"]);
    assert_eq!(
        ids(t.hub.list_edit_requests(Some(bogus.as_slice()), Some("u-grace")).await.unwrap()),
        vec![a1.request.id, g1.request.id]
    );
}

#[tokio::test]
async fn test_reject_keeps_media_and_is_final() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let record = t
        .hub
        .submit_edit_request(
            dataset.id,
            None,
            &[FieldChange::new("name", "", "Rye & Co")],
            &[jpeg("a.jpg", b"a")],
            &ada(),
            &SubmissionMeta::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let id = record.request.id;

    t.hub.reject_edit_request(id, "reviewer-1").await.unwrap();

    let rejected = t.hub.get_edit_request(id).await.unwrap();
    assert_eq!(rejected.request.status, RequestStatus::Rejected);
    assert_eq!(rejected.request.rejected_by.as_deref(), Some("reviewer-1"));
    assert!(rejected.request.rejected_at.is_some());
    assert_eq!(t.objects.keys().await, vec![record.attachments[0].locator.clone()]);

    assert!(matches!(t.hub.reject_edit_request(id, "reviewer-1").await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        t.hub.approve_edit_request(id, &[], "reviewer-1", &CancellationToken::new()).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(t.hub.reject_edit_request(999, "reviewer-1").await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_summary_and_export_skip_void_details() {
    let t = create_test_hub().await;
    let dataset = ingest_shops(&t.hub, "shops").await;
    let cancel = CancellationToken::new();
    let meta = SubmissionMeta::default();

    t.hub
        .submit_edit_request(
            dataset.id,
            None,
            &[
                FieldChange::new("name", "", "Rye & Co"),
                FieldChange::new("hours", "", ""),
                FieldChange::new("city", "", "Hull, East Yorkshire"),
            ],
            &[],
            &ada(),
            &meta,
            &cancel,
        )
        .await
        .unwrap();
    t.hub
        .submit_edit_request(dataset.id, None, &[FieldChange::new("name", "Rye & Co", "Rye")], &[], &grace(), &meta, &cancel)
        .await
        .unwrap();

    let summary = t.hub.change_summary(dataset.id).await.unwrap();
    let counts: Vec<(&str, u64)> = summary.iter().map(|c| (c.field_name.as_str(), c.changes)).collect();
    assert_eq!(counts, vec![("city", 1), ("name", 2)]);

    let csv = t.hub.export_changes(dataset.id).await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "request_id,status,row_id,field_name,old_value,new_value,created_at");
    assert_eq!(lines.len(), 4);
    assert!(!csv.contains(",hours,"));
    assert!(csv.contains("\"Hull, East Yorkshire\""));
    assert!(lines[1..].iter().all(|l| l.contains(",pending,")));
}

#[tokio::test]
async fn test_summary_of_unknown_dataset() {
    let t = create_test_hub().await;
    assert!(matches!(t.hub.change_summary(404).await, Err(StoreError::NotFound(_))));
    assert!(matches!(t.hub.export_changes(404).await, Err(StoreError::NotFound(_))));
}
