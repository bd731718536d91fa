use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;

fn bank(project: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("memory-bank")?;
    cmd.arg("--project")
        .arg(project)
        .env_remove("MEMORY_BANK_DB")
        .env_remove("MEMORY_BANK_SKIP_DUPLICATES")
        .env_remove("MEMORY_BANK_SEARCH_LIMIT");
    Ok(cmd)
}

fn json_stdout(cmd: &mut Command) -> Result<Value, Box<dyn std::error::Error>> {
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

fn add(project: &Path, title: &str, content: &str, ty: &str) -> Result<i64, Box<dyn std::error::Error>> {
    let value = json_stdout(bank(project)?.args([
        "add", "--title", title, "--content", content, "--type", ty,
    ]))?;
    value["id"].as_i64().ok_or_else(|| "missing id".into())
}

#[test]
fn add_is_idempotent_for_identical_content() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let first = add(dir.path(), "timeout", "request timed out after 30s", "error")?;
    let second = add(dir.path(), "other title", "request timed out after 30s", "memo")?;
    assert_eq!(first, second);

    let stats = json_stdout(bank(dir.path())?.arg("stats"))?;
    assert_eq!(stats["total_items"], 1);
    assert_eq!(stats["by_type"]["error"], 1);
    assert!(dir.path().join(".memory-bank/knowledge.db").exists());
    Ok(())
}

#[test]
fn search_finds_added_items() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    add(dir.path(), "pool exhaustion", "connection pool ran dry", "error")?;
    add(dir.path(), "raise pool size", "bumped max connections to 50", "solution")?;

    let hits = json_stdout(bank(dir.path())?.args(["search", "pool"]))?;
    assert_eq!(hits.as_array().map(Vec::len), Some(2));

    let hits = json_stdout(bank(dir.path())?.args(["search", "pool", "--type", "solution"]))?;
    assert_eq!(hits[0]["title"], "raise pool size");
    assert_eq!(hits[0]["type"], "solution");

    let starred = json_stdout(bank(dir.path())?.args(["search", "*exhaustion"]))?;
    assert_eq!(starred[0]["title"], "pool exhaustion");

    let recent = json_stdout(bank(dir.path())?.args(["search", "*", "--limit", "1"]))?;
    assert_eq!(recent.as_array().map(Vec::len), Some(1));
    assert_eq!(recent[0]["title"], "raise pool size");
    Ok(())
}

#[test]
fn link_and_list_linked() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let solution = add(dir.path(), "fix", "set retries to 3", "solution")?;
    let error = add(dir.path(), "flaky", "intermittent 502 from upstream", "error")?;

    let out = json_stdout(bank(dir.path())?.args([
        "link",
        &solution.to_string(),
        &error.to_string(),
        "solves",
    ]))?;
    assert_eq!(out["ok"], true);

    let linked = json_stdout(bank(dir.path())?.args(["linked", &solution.to_string()]))?;
    assert_eq!(linked[0]["id"], error);
    assert_eq!(linked[0]["title"], "flaky");
    assert_eq!(linked[0]["link_type"], "solves");

    let reverse = json_stdout(bank(dir.path())?.args(["linked", &error.to_string()]))?;
    assert_eq!(reverse, Value::Array(Vec::new()));
    Ok(())
}

#[test]
fn unknown_type_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    bank(dir.path())?
        .args(["add", "--title", "t", "--content", "c", "--type", "bogus"])
        .assert()
        .failure()
        .stderr(contains("bogus"));
    Ok(())
}

#[test]
fn batch_reports_failed_items() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = r#"[
        {"title": "one", "content": "first", "type": "memo"},
        {"title": "", "content": "no title", "type": "memo"},
        {"title": "three", "content": "third", "type": "nonsense"},
        {"title": "four", "content": "fourth", "type": "code", "tags": ["rust"]}
    ]"#;
    let report = json_stdout(bank(dir.path())?.arg("batch").write_stdin(input))?;
    assert_eq!(report["ids"].as_array().map(Vec::len), Some(2));
    let failed: Vec<i64> = report["failed"]
        .as_array()
        .map(|f| f.iter().filter_map(|e| e["index"].as_i64()).collect())
        .unwrap_or_default();
    assert_eq!(failed, vec![1, 2]);

    let stats = json_stdout(bank(dir.path())?.arg("stats"))?;
    assert_eq!(stats["total_items"], 2);
    Ok(())
}

#[test]
fn export_then_import_into_another_project() -> Result<(), Box<dyn std::error::Error>> {
    let src = tempdir()?;
    let dst = tempdir()?;
    add(src.path(), "a", "alpha", "concept")?;
    add(src.path(), "b", "beta", "pattern")?;

    let exported = bank(src.path())?
        .arg("export")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(exported.clone())?.lines().count(), 2);

    let out = json_stdout(bank(dst.path())?.arg("import").write_stdin(exported))?;
    assert_eq!(out["imported"], 2);

    let item = json_stdout(bank(dst.path())?.args(["get", "1"]))?;
    assert_eq!(item["title"], "a");
    let missing = json_stdout(bank(dst.path())?.args(["get", "99"]))?;
    assert_eq!(missing, Value::Null);
    Ok(())
}
