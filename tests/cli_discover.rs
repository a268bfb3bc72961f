mod site_stub;

use predicates::prelude::*;
use serialarchive::formats::ItemIndex;
use site_stub::{SiteStub, post_html};

#[test]
fn cache_key_prints_query_insensitive_name() {
    let expected = serialarchive::cache::cache_key("https://x/img.png");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("serialarchive");
    cmd.args(["cache-key", "--url", "https://x/img.png?v=9"])
        .assert()
        .success()
        .stdout(format!("{expected}\n"));
}

#[test]
fn discover_writes_item_snapshot() -> anyhow::Result<()> {
    let site = SiteStub::spawn();
    site.page("/ep/1/", post_html("Item 1", Some("/ep/2/"), &[], None));
    site.page("/ep/2/", post_html("Item 2", None, &[], None));
    let temp = tempfile::TempDir::new()?;
    let work_dir = temp.path().join("work");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("serialarchive");
    cmd.env("RUST_LOG", "debug")
        .args([
            "discover",
            "--work-dir",
            work_dir.to_str().unwrap(),
            "--seed-url",
            &site.url("/ep/1/"),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 items indexed"))
        .stderr(predicate::str::contains("parsed cli"));

    let snapshot = std::fs::read_to_string(work_dir.join("items.json"))?;
    let items: ItemIndex = serde_json::from_str(&snapshot)?;
    assert_eq!(items.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert!(work_dir.join("out").is_dir());
    Ok(())
}

#[test]
fn non_http_seed_fails_before_any_work() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let work_dir = temp.path().join("work");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("serialarchive");
    cmd.args([
        "archive",
        "--work-dir",
        work_dir.to_str().unwrap(),
        "--seed-url",
        "ftp://blog.test/start/",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("http/https"));

    assert!(!work_dir.exists());
    Ok(())
}
