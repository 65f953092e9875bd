use grabber_core::{
    accepted_urls, effective_quality, run_fingerprint, DeliveryMode, DownloadLocation,
    ExportFormat, ExportOutcome, ExportRequest, ItemFailure, NamingMode,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn accepted_urls_keep_http_only_in_first_occurrence_order() {
    let input = strings(&[
        "https://a.example/1.jpg",
        "ftp://a.example/2.jpg",
        "data:image/png;base64,AAAA",
        "http://b.example/3.png",
        "https://a.example/1.jpg",
        "relative/4.jpg",
        "",
        "http://b.example/3.png",
    ]);

    assert_eq!(
        accepted_urls(&input),
        strings(&["https://a.example/1.jpg", "http://b.example/3.png"])
    );
}

#[test]
fn low_performance_quality_rule() {
    assert_eq!(effective_quality(90, 25, true), 70);
    assert_eq!(effective_quality(55, 30, true), 50);
    assert_eq!(effective_quality(90, 10, true), 90);
    assert_eq!(effective_quality(90, 20, true), 90);
    assert_eq!(effective_quality(90, 25, false), 90);
}

#[test]
fn fingerprint_is_deterministic_and_order_sensitive() {
    let a = strings(&["https://x/1", "https://x/2"]);
    let b = strings(&["https://x/2", "https://x/1"]);

    assert_eq!(run_fingerprint(&a), run_fingerprint(&a.clone()));
    assert_ne!(run_fingerprint(&a), run_fingerprint(&b));
    assert_eq!(run_fingerprint(&a).len(), 64);
}

#[test]
fn empty_payload_yields_defaults() {
    let request = ExportRequest::from_json(&json!({}));
    assert_eq!(request, ExportRequest::default());
    assert_eq!(request.quality, 90);
    assert_eq!(request.batch_size, 5);
    assert_eq!(request.inter_batch_delay_ms, 100);
    assert_eq!(request.page_title, "Images");
    assert_eq!(request.site_id, "any");
}

#[test]
fn well_formed_payload_is_read() {
    let request = ExportRequest::from_json(&json!({
        "urls": ["https://a/1.jpg", 42, "https://a/2.jpg"],
        "quality": 75,
        "deliveryMode": "archive",
        "format": "jpg",
        "folderName": "trip",
        "batchSize": 3,
        "interBatchDelayMs": 0,
        "namingMode": "custom",
        "customTemplate": "{site}-{index}",
        "pageTitle": "Holiday",
        "siteId": "example.com",
        "lowPerformanceMode": true,
        "downloadLocation": "ask"
    }));

    assert_eq!(request.urls, strings(&["https://a/1.jpg", "https://a/2.jpg"]));
    assert_eq!(request.quality, 75);
    assert_eq!(request.delivery_mode, DeliveryMode::Archive);
    assert_eq!(request.format, ExportFormat::Jpeg);
    assert_eq!(request.folder_name, "trip");
    assert_eq!(request.batch_size, 3);
    assert_eq!(request.inter_batch_delay_ms, 0);
    assert_eq!(request.naming_mode, NamingMode::Custom);
    assert_eq!(request.custom_template, "{site}-{index}");
    assert_eq!(request.page_title, "Holiday");
    assert_eq!(request.site_id, "example.com");
    assert!(request.low_performance_mode);
    assert_eq!(request.download_location, DownloadLocation::Ask);
}

#[test]
fn malformed_fields_fall_back_to_defaults() {
    let request = ExportRequest::from_json(&json!({
        "urls": "https://not-a-list",
        "quality": "high",
        "deliveryMode": "carrier-pigeon",
        "format": "tiff",
        "batchSize": 0,
        "interBatchDelayMs": -5,
        "namingMode": 7,
        "lowPerformanceMode": "yes"
    }));

    assert_eq!(request, ExportRequest::default());
}

#[test]
fn quality_is_clamped_and_legacy_keys_are_understood() {
    let request = ExportRequest::from_json(&json!({
        "quality": 250,
        "zipBundle": true,
        "downloadDelay": 40,
        "lowPerf": true,
        "site": "legacy.example"
    }));

    assert_eq!(request.quality, 100);
    assert_eq!(request.delivery_mode, DeliveryMode::Archive);
    assert_eq!(request.inter_batch_delay_ms, 40);
    assert!(request.low_performance_mode);
    assert_eq!(request.site_id, "legacy.example");

    let low = ExportRequest::from_json(&json!({ "quality": -3 }));
    assert_eq!(low.quality, 1);
}

#[test]
fn non_object_payload_is_all_defaults() {
    assert_eq!(
        ExportRequest::from_json(&json!([1, 2, 3])),
        ExportRequest::default()
    );
}

#[test]
fn outcome_wire_shapes() {
    assert_eq!(ExportOutcome::Completed.to_json(), json!({ "ok": true }));
    assert_eq!(
        ExportOutcome::Rejected("No valid URLs.".into()).to_json(),
        json!({ "ok": false, "error": "No valid URLs." })
    );
    let partial = ExportOutcome::from_failures(vec![ItemFailure {
        url: "https://a/1.jpg".into(),
        error: "timeout".into(),
    }]);
    assert_eq!(
        partial.to_json(),
        json!({ "ok": false, "failures": [{ "url": "https://a/1.jpg", "error": "timeout" }] })
    );
    assert_eq!(ExportOutcome::from_failures(Vec::new()), ExportOutcome::Completed);
}
