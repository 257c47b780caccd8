use assert_cmd::Command;
use httpmock::prelude::*;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use predicates::prelude::*;
use serde_json::json;
use std::fs::{self, write};
use std::path::{Path, PathBuf};

const SETTINGS_ENV: [&str; 8] = [
    "CONTRACT_LENS_API_KEY",
    "ANTHROPIC_API_KEY",
    "CONTRACT_LENS_ENDPOINT",
    "CONTRACT_LENS_MODEL",
    "CONTRACT_LENS_TIMEOUT_SECS",
    "CONTRACT_LENS_MAX_RETRIES",
    "CONTRACT_LENS_CURRENCY",
    "CONTRACT_LENS_EXCHANGE_RATE",
];

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

fn bare() -> Command {
    let mut cmd = Command::cargo_bin("contract-lens").unwrap();
    for key in SETTINGS_ENV {
        cmd.env_remove(key);
    }
    cmd.env("NO_COLOR", "1").env("RUST_LOG", "warn");
    cmd
}

fn cli() -> Command {
    let mut cmd = bare();
    cmd.args(["--guidelines-dir", data_dir().to_str().unwrap()]);
    cmd
}

fn write_contract(path: &Path) {
    let lines = [
        "Sponsorship Agreement between Brand and Creator for three videos.",
        "The Creator grants the Brand a perpetual license to all delivered content.",
        "Late delivery triggers a penalty equal to twice the total fee.",
    ];
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("Td", vec![40.into(), 740.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        Content { operations }.encode().unwrap(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

const ANALYSIS: &str = "## 1. Overall Assessment
High risk; the license never expires and late delivery is punished hard.

## 2. Critical Risks
- Perpetual license (🔴)
- Penalty of twice the fee (🔴)

## 3. Negotiation Strategy
Limit the license to 12 months and cap the penalty at the fee.";

/// Copy the sample guidelines and inflate the negotiation guide so the
/// estimate passes the confirmation threshold.
fn costly_guidelines(dir: &Path) {
    for name in ["guideline_risk.txt", "redflags.json"] {
        fs::copy(data_dir().join(name), dir.join(name)).unwrap();
    }
    write(dir.join("guideline_negotiation.txt"), "x".repeat(1_400_000)).unwrap();
}

fn reports_in(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("contract_review_"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn mock_analysis<'a>(server: &'a MockServer, text: &str) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "sk-ant-test");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "content": [{ "type": "text", "text": text }],
                "usage": { "input_tokens": 900, "output_tokens": 120 }
            }));
    })
}

#[test]
fn estimate_cost_stops_before_analysis() {
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let output = temp.path().join("output");

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args([
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--estimate-cost",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Estimated cost:"))
        .stdout(predicate::str::contains("KRW"))
        .stdout(predicate::str::contains("perpetual [critical]"));

    assert!(!output.exists(), "no report should be written");
}

#[test]
fn config_file_supplies_settings() {
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let config = temp.path().join("contract-lens.toml");
    write(
        &config,
        "api_key = \"sk-ant-from-file\"\ncurrency = \"usd\"\nexchange_rate = 1.0\n",
    )
    .unwrap();

    cli()
        .args([
            "--config",
            config.to_str().unwrap(),
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--estimate-cost",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("USD"));
}

#[test]
fn rejects_malformed_api_key() {
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);

    cli()
        .env("CONTRACT_LENS_API_KEY", "not-a-key")
        .args([
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--estimate-cost",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("sk-ant-"));
}

#[test]
fn missing_contract_fails() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing.pdf");

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args(["review", "--contract", missing.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn non_pdf_contract_fails() {
    let temp = tempfile::tempdir().unwrap();
    let notes = temp.path().join("notes.txt");
    write(&notes, "not a pdf").unwrap();

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args(["review", "--contract", notes.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only PDF files are supported"));
}

#[test]
fn summarize_empty_directory_fails() {
    let temp = tempfile::tempdir().unwrap();

    cli()
        .args(["summarize", "--reports-dir", temp.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no review reports"));
}

#[test]
fn summarize_writes_requested_file() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path().join("contract_review_deal_20250101_120000.md"),
        "# Contract Review Report\n**Filename**: deal.pdf\n",
    )
    .unwrap();
    let out = temp.path().join("summary.md");

    cli()
        .args([
            "summarize",
            "--reports-dir",
            temp.path().to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary saved:"));

    let summary = std::fs::read_to_string(out).unwrap();
    assert!(summary.contains("1. **deal.pdf**"));
}

#[test]
fn red_flags_json_lists_keywords() {
    cli()
        .args(["red-flags", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"keyword\": \"perpetual\""))
        .stdout(predicate::str::contains("\"severity\": \"critical\""));
}

#[test]
fn red_flags_missing_directory_fails() {
    let temp = tempfile::tempdir().unwrap();

    Command::cargo_bin("contract-lens")
        .unwrap()
        .env("NO_COLOR", "1")
        .args([
            "--guidelines-dir",
            temp.path().join("nope").to_str().unwrap(),
            "red-flags",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load guidelines"));
}

#[test]
fn unreadable_pdf_fails_before_settings() {
    let temp = tempfile::tempdir().unwrap();
    let broken = temp.path().join("broken.pdf");
    write(&broken, b"%PDF-1.4 junk without any objects").unwrap();

    cli()
        .args(["review", "--contract", broken.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("PDF cannot be opened"))
        .stdout(predicate::str::contains("Contract:").not());
}

#[test]
fn declined_cost_prompt_cancels_review() {
    let temp = tempfile::tempdir().unwrap();
    let guidelines = temp.path().join("guidelines");
    fs::create_dir(&guidelines).unwrap();
    costly_guidelines(&guidelines);
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let output = temp.path().join("output");

    bare()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args([
            "--guidelines-dir",
            guidelines.to_str().unwrap(),
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Continue? (y/N)"))
        .stdout(predicate::str::contains("Review cancelled."));

    assert!(!output.exists(), "no report should be written");
}

#[test]
fn yes_flag_skips_cost_prompt() {
    let temp = tempfile::tempdir().unwrap();
    let guidelines = temp.path().join("guidelines");
    fs::create_dir(&guidelines).unwrap();
    costly_guidelines(&guidelines);
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);

    // The inflated guidelines also exceed the token ceiling, so the run stops
    // inside analysis without reaching the network.
    bare()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args([
            "--guidelines-dir",
            guidelines.to_str().unwrap(),
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--yes",
        ])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("(y/N)").not())
        .stderr(predicate::str::contains("contract is too large"));
}

#[cfg(unix)]
#[test]
fn interrupt_at_prompt_exits_with_failure() {
    use std::io::Read;
    use std::process::Stdio;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    let temp = tempfile::tempdir().unwrap();
    let guidelines = temp.path().join("guidelines");
    fs::create_dir(&guidelines).unwrap();
    costly_guidelines(&guidelines);
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);

    let mut command = std::process::Command::new(assert_cmd::cargo::cargo_bin("contract-lens"));
    for key in SETTINGS_ENV {
        command.env_remove(key);
    }
    let mut child = command
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "warn")
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args([
            "--guidelines-dir",
            guidelines.to_str().unwrap(),
            "review",
            "--contract",
            contract.to_str().unwrap(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    // Keep stdin open so the prompt blocks on input.
    let _stdin = child.stdin.take();
    let mut stdout = child.stdout.take().unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 256];
        while let Ok(read) = stdout.read(&mut buf) {
            if read == 0 || tx.send(buf[..read].to_vec()).is_err() {
                break;
            }
        }
    });

    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(30);
    while !String::from_utf8_lossy(&seen).contains("(y/N)") {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(chunk) => seen.extend(chunk),
            Err(_) => {
                let _ = child.kill();
                panic!("prompt never appeared: {}", String::from_utf8_lossy(&seen));
            }
        }
    }

    let status = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("process still running after interrupt");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(exit.code(), Some(1));
}

#[test]
#[ignore = "requires loopback networking"]
fn review_writes_report() {
    let server = MockServer::start();
    let mock = mock_analysis(&server, ANALYSIS);
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let output = temp.path().join("output");

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .env("CONTRACT_LENS_ENDPOINT", server.base_url())
        .env("CONTRACT_LENS_MAX_RETRIES", "1")
        .args([
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("(y/N)").not())
        .stdout(predicate::str::contains("Report saved:"));

    mock.assert();
    let reports = reports_in(&output);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("contract_review_deal_"));
    let report = fs::read_to_string(output.join(&reports[0])).unwrap();
    assert!(report.contains("**Filename**: deal.pdf"));
    assert!(report.contains("Limit the license to 12 months"));
}

#[test]
#[ignore = "requires loopback networking"]
fn yes_flag_saves_incomplete_analysis() {
    let server = MockServer::start();
    let mock = mock_analysis(&server, "## Overall Assessment\nToo short.");
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let output = temp.path().join("output");

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .env("CONTRACT_LENS_ENDPOINT", server.base_url())
        .env("CONTRACT_LENS_MAX_RETRIES", "1")
        .args([
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning:"))
        .stdout(predicate::str::contains("(y/N)").not())
        .stdout(predicate::str::contains("Report saved:"));

    mock.assert();
    assert_eq!(reports_in(&output).len(), 1);
}

#[test]
#[ignore = "requires loopback networking"]
fn declined_validation_prompt_discards_report() {
    let server = MockServer::start();
    let mock = mock_analysis(&server, "## Overall Assessment\nToo short.");
    let temp = tempfile::tempdir().unwrap();
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);
    let output = temp.path().join("output");

    cli()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .env("CONTRACT_LENS_ENDPOINT", server.base_url())
        .env("CONTRACT_LENS_MAX_RETRIES", "1")
        .args([
            "review",
            "--contract",
            contract.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Save the report anyway? (y/N)"))
        .stdout(predicate::str::contains("Report discarded."));

    mock.assert();
    assert!(reports_in(&output).is_empty());
}

#[test]
fn accepted_cost_prompt_proceeds_to_analysis() {
    let temp = tempfile::tempdir().unwrap();
    let guidelines = temp.path().join("guidelines");
    fs::create_dir(&guidelines).unwrap();
    costly_guidelines(&guidelines);
    let contract = temp.path().join("deal.pdf");
    write_contract(&contract);

    bare()
        .env("CONTRACT_LENS_API_KEY", "sk-ant-test")
        .args([
            "--guidelines-dir",
            guidelines.to_str().unwrap(),
            "review",
            "--contract",
            contract.to_str().unwrap(),
        ])
        .write_stdin("y\n")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Continue? (y/N)"))
        .stdout(predicate::str::contains("Review cancelled.").not())
        .stderr(predicate::str::contains("contract is too large"));
}
