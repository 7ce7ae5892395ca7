mod common;

use std::path::Path;

use common::*;
use diskprices_scraper::crawl::{CrawlStatus, Crawler, FilterConfig, SortKey};
use diskprices_scraper::sink::{read_latest_pointer, Checkpoint, SnapshotFormat};
use tokio_util::sync::CancellationToken;

fn diagnostics_with_suffix(output_dir: &Path, suffix: &str) -> Vec<std::path::PathBuf> {
    let dir = output_dir.join("diagnostics");
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().ends_with(suffix))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_walks_pages_until_no_next_control() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![
        numbered_page(1, 3, true),
        numbered_page(2, 3, true),
        numbered_page(3, 2, false),
    ]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 8, pages: 3 });
    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.records.len(), 8);
    assert_eq!(report.records[0].product_name, "Disk p1-0");
    assert_eq!(report.records[7].product_name, "Disk p3-1");
    assert_eq!(session.clicks(), vec!["script:next", "script:next"]);
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_page_cap_stops_without_extra_click() {
    let dir = tempfile::tempdir().unwrap();
    let pages = (1..=5).map(|p| numbered_page(p, 2, true)).collect();
    let session = FakeSession::new(pages);
    let config = test_config(dir.path()).with_page_cap(2);

    let report = Crawler::new(session.clone(), config).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 4, pages: 2 });
    assert_eq!(session.clicks().len(), 1);
    assert_eq!(session.current_page(), 1);
}

#[tokio::test]
async fn test_disabled_next_control_ends_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let disabled = next_link().with_attr("aria-disabled", "true");
    let first = catalog_page(
        vec![product_row("Only", "2TB", "$50.00", "$25.00/TB")],
        Some(disabled),
    );
    let session = FakeSession::new(vec![first, numbered_page(2, 2, false)]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 1, pages: 1 });
    assert!(session.clicks().is_empty());
}

#[tokio::test]
async fn test_disabled_class_ends_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let disabled = next_link().with_attr("class", "page-link disabled");
    let first = catalog_page(
        vec![product_row("Only", "2TB", "$50.00", "$25.00/TB")],
        Some(disabled),
    );
    let session = FakeSession::new(vec![first, numbered_page(2, 2, false)]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    assert!(report.status.is_done());
    assert_eq!(report.pages_visited, 1);
    assert!(session.clicks().is_empty());
}

#[tokio::test]
async fn test_short_rows_are_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let page = catalog_page(
        vec![
            FakeNode::new("header"),
            row(&["Ad", "Sponsored"]),
            row(&["Seagate Expansion 4TB", "4TB", "$89.99", "$22.50/TB"]),
            row(&["Bare", "1TB", "$40.00"]),
        ],
        None,
    );
    let session = FakeSession::new(vec![page]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.records.len(), 2);
    let seagate = &report.records[0];
    assert_eq!(seagate.product_name, "Seagate Expansion 4TB");
    assert_eq!(seagate.price_value, Some(89.99));
    assert_eq!(seagate.price_per_tb_value, Some(22.5));
    assert_eq!(seagate.interface, None);
    assert_eq!(seagate.seller, None);

    let bare = &report.records[1];
    assert_eq!(bare.price_per_tb, None);
    assert_eq!(bare.price_per_tb_value, None);
}

#[tokio::test]
async fn test_product_and_seller_links_captured() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 1, false)]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    let record = &report.records[0];
    assert_eq!(record.product_url.as_deref(), Some("https://example.com/Disk p1-0"));
    assert_eq!(record.seller.as_deref(), Some("Amazon"));
    assert_eq!(record.seller_url, None);
    assert_eq!(record.capacity_tb, Some(4.0));
}

#[tokio::test]
async fn test_failure_after_two_pages_keeps_partial_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![
        numbered_page(1, 3, true),
        numbered_page(2, 3, true),
        FakePage::new().broken(),
    ]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    let CrawlStatus::Failed { error, artifacts } = &report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert!(error.contains("page crashed"));
    assert_eq!(report.records.len(), 6);

    let partial = report
        .snapshots
        .iter()
        .find(|s| s.checkpoint == Checkpoint::Partial)
        .expect("partial snapshot");
    assert_eq!(partial.record_count, 6);
    assert_eq!(partial.files.len(), 3);
    for file in &partial.files {
        assert!(artifacts.contains(file));
        assert!(file.exists());
    }

    let screenshots = diagnostics_with_suffix(dir.path(), "_error_screenshot.png");
    assert_eq!(screenshots.len(), 1);
    assert!(artifacts.contains(&screenshots[0]));
    assert_eq!(diagnostics_with_suffix(dir.path(), "_error_page.html").len(), 1);

    let latest = read_latest_pointer(dir.path()).unwrap();
    assert_eq!(latest.checkpoint, Checkpoint::Partial);
    assert_eq!(latest.record_count, 6);
    assert_eq!(report.latest_snapshot.as_ref(), Some(&latest));
    assert_eq!(report.pages_visited, 3);
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_first_page_snapshot_written_before_final() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 2, true), numbered_page(2, 2, false)]);
    let config = test_config(dir.path()).with_formats([SnapshotFormat::Json]);

    let report = Crawler::new(session, config).run().await;

    let checkpoints: Vec<_> = report.snapshots.iter().map(|s| s.checkpoint).collect();
    assert_eq!(checkpoints, vec![Checkpoint::FirstPage, Checkpoint::Final]);
    assert_eq!(report.snapshots[0].record_count, 2);
    assert_eq!(report.snapshots[1].record_count, 4);

    let first = &report.snapshots[0].files[0];
    let name = first.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("diskprices_first_page_"));
    assert!(name.ends_with(".json"));

    let latest = read_latest_pointer(dir.path()).unwrap();
    assert_eq!(latest.checkpoint, Checkpoint::Final);
    assert_eq!(report.latest_snapshot, Some(latest));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 2, false)]);
    let token = CancellationToken::new();
    token.cancel();

    let report = Crawler::new(session.clone(), test_config(dir.path()))
        .with_cancellation(token)
        .run()
        .await;

    assert!(matches!(report.status, CrawlStatus::Failed { .. }));
    assert!(report.records.is_empty());
    assert!(report.snapshots.is_empty());
    assert!(session.site.lock().unwrap().navigations.is_empty());
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_navigation_failure_captures_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 2, false)])
        .failing_navigation("net::ERR_CONNECTION_REFUSED");

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    let CrawlStatus::Failed { error, artifacts } = &report.status else {
        panic!("expected failure");
    };
    assert!(error.contains("ERR_CONNECTION_REFUSED"));
    assert_eq!(report.pages_visited, 0);
    assert_eq!(report.latest_snapshot, None);
    assert!(report.snapshots.is_empty());
    assert_eq!(artifacts.len(), 2);
    assert!(read_latest_pointer(dir.path()).is_err());
}

#[tokio::test]
async fn test_missing_tables_fail_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![FakePage::new()]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    let CrawlStatus::Failed { error, .. } = &report.status else {
        panic!("expected failure");
    };
    assert!(error.contains("テーブルが存在しません"));
}

#[tokio::test]
async fn test_empty_table_dumps_markup_and_page() {
    let dir = tempfile::tempdir().unwrap();
    let page = catalog_page(Vec::new(), None).with_table_markup("<table class=\"disktable\"></table>");
    let session = FakeSession::new(vec![page]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 0, pages: 1 });
    assert!(report.snapshots.is_empty());

    let dumps = diagnostics_with_suffix(dir.path(), "_empty_table_p1.html");
    assert_eq!(dumps.len(), 1);
    let markup = std::fs::read_to_string(&dumps[0]).unwrap();
    assert!(markup.contains("disktable"));
    assert_eq!(diagnostics_with_suffix(dir.path(), "_no_data_page.html").len(), 1);
}

#[tokio::test]
async fn test_relaxed_row_query_used_when_rows_missing() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePage::new()
        .with("table.disktable", vec![FakeNode::new("table")])
        .with("tr", vec![row(&["Loose row 2TB", "2TB", "$60.00", "$30.00/TB"])]);
    let session = FakeSession::new(vec![page]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].product_name, "Loose row 2TB");
}

#[tokio::test]
async fn test_located_table_selector_drives_row_query() {
    let dir = tempfile::tempdir().unwrap();
    let layout = FakeNode::new("layout")
        .with_children("th", vec![FakeNode::new("Menu")]);
    let prices = FakeNode::new("prices")
        .with_attr("class", "prices wide")
        .with_children("th", vec![FakeNode::new("Name"), FakeNode::new("Price/TB")]);
    let page = FakePage::new()
        .with("table", vec![layout, prices])
        .with(
            "table.prices.wide tbody tr",
            vec![row(&["Found 8TB", "8TB", "$120.00", "$15.00/TB"])],
        );
    let session = FakeSession::new(vec![page]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].price_per_tb_value, Some(15.0));
}

#[tokio::test]
async fn test_filters_applied_and_unsupported_reported() {
    let dir = tempfile::tempdir().unwrap();
    let page = numbered_page(1, 1, false)
        .with("button", vec![FakeNode::new("Internal")])
        .with("th", vec![FakeNode::new("Price"), FakeNode::new("Price/TB")]);
    let session = FakeSession::new(vec![page]);
    let filters = FilterConfig::from_json_str(
        r#"{"type": "internal", "capacity": "1TB-4TB", "sortBy": "price_per_tb"}"#,
    )
    .unwrap();
    let config = test_config(dir.path()).with_filters(filters);

    let report = Crawler::new(session.clone(), config).run().await;

    assert!(report.status.is_done());
    assert_eq!(report.filters.applied.len(), 2);
    assert_eq!(report.filters.applied[0], "type=internal");
    assert_eq!(report.filters.unapplied, vec!["capacity=1TB-4TB".to_string()]);
    assert_eq!(session.clicks(), vec!["click:Internal", "click:Price/TB"]);
}

#[tokio::test]
async fn test_sort_by_price_matches_exact_header() {
    let dir = tempfile::tempdir().unwrap();
    let page = numbered_page(1, 1, false)
        .with("th", vec![FakeNode::new("Price/TB"), FakeNode::new("Price")]);
    let session = FakeSession::new(vec![page]);
    let config = test_config(dir.path())
        .with_filters(FilterConfig::default().with_sort(SortKey::Price));

    let report = Crawler::new(session.clone(), config).run().await;

    assert!(report.filters.unapplied.is_empty());
    assert_eq!(session.clicks(), vec!["click:Price"]);
}

#[tokio::test]
async fn test_missing_filter_control_does_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 2, false)]);
    let config = test_config(dir.path())
        .with_filters(FilterConfig::default().with_type("external"));

    let report = Crawler::new(session, config).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 2, pages: 1 });
    assert_eq!(report.filters.unapplied, vec!["type=external".to_string()]);
}

#[tokio::test]
async fn test_next_control_that_does_not_advance_ends_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let stuck = FakeNode::new("Next").labeled("next");
    let first = catalog_page(
        vec![
            product_row("Stuck A", "4TB", "$80.00", "$20.00/TB"),
            product_row("Stuck B", "8TB", "$150.00", "$18.75/TB"),
        ],
        Some(stuck),
    );
    let session = FakeSession::new(vec![first]);
    let config = test_config(dir.path()).with_page_cap(5);

    let report = Crawler::new(session.clone(), config).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 2, pages: 1 });
    assert_eq!(report.records.len(), 2);
    assert_eq!(session.clicks(), vec!["script:next"]);
}

#[tokio::test]
async fn test_product_link_starting_with_next_is_not_pagination() {
    let dir = tempfile::tempdir().unwrap();
    let page = numbered_page(1, 2, false)
        .with("a", vec![FakeNode::new("Nextorage NE1N 2TB").advancing()]);
    let session = FakeSession::new(vec![page, numbered_page(2, 2, false)]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 2, pages: 1 });
    assert!(session.clicks().is_empty());
    assert_eq!(session.current_page(), 0);
}

#[tokio::test]
async fn test_rows_repeated_on_next_page_are_kept_once() {
    let dir = tempfile::tempdir().unwrap();
    let a = || product_row("Repeat A", "4TB", "$80.00", "$20.00/TB");
    let b = || product_row("Repeat B", "8TB", "$150.00", "$18.75/TB");
    let c = product_row("Fresh C", "12TB", "$200.00", "$16.67/TB");
    let session = FakeSession::new(vec![
        catalog_page(vec![a(), b()], Some(next_link())),
        catalog_page(vec![a(), b(), c], None),
    ]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.status, CrawlStatus::Done { records: 3, pages: 2 });
    let names: Vec<_> = report.records.iter().map(|r| r.product_name.as_str()).collect();
    assert_eq!(names, vec!["Repeat A", "Repeat B", "Fresh C"]);
}

#[tokio::test]
async fn test_lost_browser_connection_fails_with_partial_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![
        numbered_page(1, 3, true),
        numbered_page(2, 3, true),
        FakePage::disconnected(),
    ]);

    let report = Crawler::new(session.clone(), test_config(dir.path())).run().await;

    let CrawlStatus::Failed { error, artifacts } = &report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert!(error.contains("connection closed"));
    assert_eq!(report.records.len(), 6);

    let latest = report.latest_snapshot.as_ref().expect("partial snapshot");
    assert_eq!(latest.checkpoint, Checkpoint::Partial);
    assert_eq!(latest.record_count, 6);

    let screenshots = diagnostics_with_suffix(dir.path(), "_error_screenshot.png");
    assert_eq!(screenshots.len(), 1);
    assert!(artifacts.contains(&screenshots[0]));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_cancelled_between_pages_keeps_partial_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let session = FakeSession::new(vec![numbered_page(1, 2, true), numbered_page(2, 2, false)])
        .cancelling_on_click(token.clone());

    let report = Crawler::new(session.clone(), test_config(dir.path()))
        .with_cancellation(token)
        .run()
        .await;

    let CrawlStatus::Failed { error, artifacts } = &report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert!(error.contains("キャンセル"));
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.pages_visited, 1);

    let latest = read_latest_pointer(dir.path()).unwrap();
    assert_eq!(latest.checkpoint, Checkpoint::Partial);
    assert_eq!(latest.record_count, 2);

    let screenshots = diagnostics_with_suffix(dir.path(), "_error_screenshot.png");
    assert_eq!(screenshots.len(), 1);
    assert!(artifacts.contains(&screenshots[0]));
    assert!(report.diagnostics.contains(&screenshots[0]));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_unknown_filter_keys_reported_unapplied() {
    let dir = tempfile::tempdir().unwrap();
    let session = FakeSession::new(vec![numbered_page(1, 1, false)]);
    let filters = FilterConfig::from_json_str(r#"{"color": "red", "minRating": 4}"#).unwrap();
    let config = test_config(dir.path()).with_filters(filters);

    let report = Crawler::new(session.clone(), config).run().await;

    assert!(report.status.is_done());
    assert!(report.filters.applied.is_empty());
    assert_eq!(
        report.filters.unapplied,
        vec!["color=red".to_string(), "minRating=4".to_string()]
    );
    assert!(session.clicks().is_empty());
}

#[tokio::test]
async fn test_seller_logo_cell_uses_image_label() {
    let dir = tempfile::tempdir().unwrap();
    let cells = vec![
        FakeNode::new("Toshiba N300 16TB"),
        FakeNode::new("16TB"),
        FakeNode::new("$279.99"),
        FakeNode::new("$17.50/TB"),
        FakeNode::new("SATA"),
        FakeNode::new("3.5\""),
        FakeNode::new("").with_html(r#"<img src="/img/bh.png" alt="B&H Photo">"#),
        FakeNode::new("4.6"),
    ];
    let logo_row = FakeNode::new("Toshiba N300 16TB").with_children("td", cells);
    let session = FakeSession::new(vec![catalog_page(vec![logo_row], None)]);

    let report = Crawler::new(session, test_config(dir.path())).run().await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].seller.as_deref(), Some("B&H Photo"));
}
