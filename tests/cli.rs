use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    config: TempDir,
    data: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            config: tempfile::tempdir().unwrap(),
            data: tempfile::tempdir().unwrap(),
        };
        ws.cmd()
            .args(["init", "--data-dir"])
            .arg(ws.data.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized ledgerlens"));
        ws
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ledgerlens").unwrap();
        cmd.env("LEDGERLENS_CONFIG_DIR", self.config.path())
            .env_remove("LEDGERLENS_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

#[test]
fn init_writes_settings_and_database() {
    let ws = Workspace::new();
    assert!(ws.config.path().join("settings.json").exists());
    assert!(ws.data.path().join("ledgerlens.db").exists());
    assert!(ws.data.path().join("exports").is_dir());
}

#[test]
fn chart_lists_default_account() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("chart")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uncategorized (default)"))
        .stdout(predicate::str::contains("Software & Subscriptions"));
}

#[test]
fn rules_add_list_delete() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["rules", "add", "ADOBE *CREATIVE CLOUD 8004", "5800"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'adobe creative cloud'"))
        .stdout(predicate::str::contains("5800 - Software & Subscriptions"));
    ws.cmd()
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("adobe creative cloud"));
    ws.cmd()
        .args(["rules", "delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted rule 1"));
    ws.cmd()
        .args(["rules", "delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already inactive"));
}

#[test]
fn rules_reject_unknown_account() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["rules", "add", "github", "Coffee"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Unknown account: Coffee"));
}

#[test]
fn memory_set_then_list() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["memory", "set", "Blue Bottle Coffee #12", "6100 - Meals"])
        .assert()
        .success();
    ws.cmd()
        .args(["memory", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blue bottle coffee"))
        .stdout(predicate::str::contains("user"));
    ws.cmd()
        .args(["memory", "list", "--global"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blue bottle coffee").not());
}

#[test]
fn ingest_rejects_non_pdf() {
    let ws = Workspace::new();
    let file = ws.data.path().join("statement.pdf");
    std::fs::write(&file, "05/02/24 STARBUCKS 4.75").unwrap();
    ws.cmd()
        .arg("ingest")
        .arg(&file)
        .args(["--source", "2000 - Credit Card Payable", "--source-type", "card"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Unreadable document"));
}

#[test]
fn ingest_text_layer_pdf() {
    let ws = Workspace::new();
    let fixture = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/statement.pdf");
    ws.cmd()
        .arg("ingest")
        .arg(&fixture)
        .args(["--source", "2000 - Credit Card Payable", "--source-type", "card", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"date\": \"05/02/2024\""))
        .stdout(predicate::str::contains("Starbucks Store 123"))
        .stdout(predicate::str::contains("\"amount\": 4.75"))
        .stdout(predicate::str::contains("\"source\": \"2000 - Credit Card Payable\""));
    ws.cmd()
        .arg("ingest")
        .arg(&fixture)
        .args(["--source", "2000 - Credit Card Payable", "--source-type", "card"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already ingested"));
}

#[test]
fn ingest_rejects_unknown_source_type() {
    let ws = Workspace::new();
    let file = ws.data.path().join("statement.pdf");
    std::fs::write(&file, "%PDF-1.4").unwrap();
    ws.cmd()
        .arg("ingest")
        .arg(&file)
        .args(["--source", "Brokerage", "--source-type", "brokerage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid source type"));
}

#[test]
fn empty_ledger_commands() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("transactions")
        .assert()
        .success()
        .stdout(predicate::str::contains("across 0 records"));
    ws.cmd()
        .arg("pair")
        .assert()
        .success()
        .stdout(predicate::str::contains("No new transfers found."));
    ws.cmd()
        .args(["policy", "reset", "1000 - Checking"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No sign policy"));
}

#[test]
fn export_writes_csv_header() {
    let ws = Workspace::new();
    let out = ws.data.path().join("out.csv");
    ws.cmd()
        .arg("export")
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 0 transactions"));
    let content = std::fs::read_to_string(out).unwrap();
    assert!(content.starts_with("id,date,memo,memo_raw,amount"));
}

#[test]
fn model_train_needs_examples() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["model", "train"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to train on"));

    ws.cmd().args(["rules", "add", "github", "5800"]).assert().success();
    ws.cmd()
        .args(["memory", "set", "starbucks", "6100 - Meals"])
        .assert()
        .success();
    ws.cmd()
        .args(["model", "train"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 examples across 2 accounts"));
    assert!(ws.data.path().join("model.json").exists());
    let settings = std::fs::read_to_string(ws.config.path().join("settings.json")).unwrap();
    assert!(settings.contains("model.json"));
}

#[test]
fn ingest_extracted_text_end_to_end() {
    let ws = Workspace::new();
    ws.cmd().args(["rules", "add", "GitHub Inc", "5800"]).assert().success();

    let file = ws.data.path().join("may.txt");
    std::fs::write(
        &file,
        "ACME CARD SERVICES\nClosing Date: 05/31/2024\n\
         01/15/2024 INTEREST CHARGE 12.00\n\
         05/02/2024 STARBUCKS STORE #123 $4.75\n\
         05/03/2024 GITHUB INC 4.00\n",
    )
    .unwrap();
    let ingest = |ws: &Workspace| {
        let mut cmd = ws.cmd();
        cmd.arg("ingest")
            .arg(&file)
            .args(["--source", "2000 - Credit Card Payable", "--source-type", "card", "--json"]);
        cmd
    };

    ingest(&ws)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"date\": \"05/02/2024\""))
        .stdout(predicate::str::contains("Starbucks Store 123"))
        .stdout(predicate::str::contains("\"classificationSource\": \"rule\""))
        .stdout(predicate::str::contains("\"classificationSource\": \"default\""))
        .stdout(predicate::str::contains("Interest").not());
    ingest(&ws)
        .assert()
        .success()
        .stdout(predicate::str::contains("already ingested"));

    ws.cmd()
        .args(["transactions", "--source-type", "card"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Starbucks Store 123"))
        .stdout(predicate::str::contains("across 2 records"));
    ws.cmd()
        .args(["policy", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Outflows/charges printed"))
        .stdout(predicate::str::contains("2000 - Credit Card Payable"));
}
