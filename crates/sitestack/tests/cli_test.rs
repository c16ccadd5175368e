#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// 環境変数や利用者の設定ファイルに左右されないコマンドを作る
fn sitestack(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sitestack").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env("RUST_LOG", "error")
        .env_remove("WEBSITE_BUCKET_NAME")
        .env_remove("DOMAIN_NAME")
        .env_remove("SITESTACK_CONFIG_PATH")
        .env_remove("AWS_PROFILE");
    cmd
}

/// dist/ にアセットを並べたプロジェクト
fn site_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let dist = dir.path().join("dist");
    fs::create_dir_all(dist.join("img")).unwrap();
    fs::write(dist.join("index.html"), "<h1>hello</h1>").unwrap();
    fs::write(dist.join("app.js"), "console.log('hi');").unwrap();
    fs::write(dist.join("img/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
    dir
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("sitestack").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("静的サイトを"))
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("manifest"))
        .stdout(predicate::str::contains("simulate"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("sitestack").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitestack"));
}

/// 存在しないコマンドはエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("sitestack").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// synthコマンドのヘルプにサイト設定のフラグが並ぶことを確認
#[test]
fn test_synth_help() {
    let mut cmd = Command::cargo_bin("sitestack").unwrap();
    cmd.arg("synth")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--bucket"))
        .stdout(predicate::str::contains("--domain"))
        .stdout(predicate::str::contains("--assets"))
        .stdout(predicate::str::contains("--prune"));
}

/// フラグだけでスタック定義を生成できることを確認
#[test]
fn test_synth_writes_stack_document() {
    let project = site_project();

    sitestack(project.path())
        .args(["synth", "--bucket", "site-assets-example", "--domain", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("スタックを生成しました"))
        .stdout(predicate::str::contains("example.com"));

    let path = project.path().join("sitestack.out/stack.json");
    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(document["stack"], "website");
    assert!(document["resource"]["distribution"]["website"].is_object());
    assert!(document["resource"]["storage_object"]["index.html"].is_object());
    assert_eq!(
        document["output"]["distribution_id"]["value"],
        "${distribution.website.id}"
    );
}

/// 設定ファイルの値がフラグで上書きされることを確認
#[test]
fn test_synth_flags_override_site_file() {
    let project = site_project();
    fs::write(
        project.path().join("site.yaml"),
        "website_bucket_name: from-file-bucket\ndomain_name: file.example.com\n",
    )
    .unwrap();

    sitestack(project.path())
        .args(["synth", "--domain", "flag.example.com", "--out", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-file-bucket"))
        .stdout(predicate::str::contains("flag.example.com"));

    assert!(project.path().join("out/stack.json").exists());
}

/// ドメイン名が無いとエラーになることを確認
#[test]
fn test_synth_requires_domain() {
    let project = site_project();

    sitestack(project.path())
        .args(["synth", "--bucket", "site-assets-example"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("domain_name"));
}

/// manifestコマンドがキーとContent-Typeを表示することを確認
#[test]
fn test_manifest_lists_assets() {
    let project = site_project();

    sitestack(project.path())
        .arg("manifest")
        .assert()
        .success()
        .stdout(predicate::str::contains("index.html"))
        .stdout(predicate::str::contains("img/logo.png"))
        .stdout(predicate::str::contains("text/html"))
        .stdout(predicate::str::contains("ファイル: 3個"));
}

/// manifest --json がエントリの配列を出力することを確認
#[test]
fn test_manifest_json() {
    let project = site_project();

    let output = sitestack(project.path())
        .args(["manifest", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["relative_key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["app.js", "img/logo.png", "index.html"]);
}

/// simulateコマンドがディストリビューションIDを出力することを確認
#[test]
fn test_simulate_reports_distribution_id() {
    let project = site_project();

    sitestack(project.path())
        .args(["simulate", "--bucket", "site-assets-example", "--domain", "example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("適用しました"))
        .stdout(predicate::str::contains("オブジェクト: 3/3個"))
        .stdout(predicate::str::contains("distribution_id = E"));
}

/// 未適用のプロジェクトでは出力値が無いことを確認
#[test]
fn test_output_without_state_fails() {
    let project = site_project();

    sitestack(project.path())
        .arg("output")
        .assert()
        .failure()
        .stderr(predicate::str::contains("distribution_id"));
}
