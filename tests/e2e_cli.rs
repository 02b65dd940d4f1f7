use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

use cli_helpers::*;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

#[test]
fn offline_run_prints_plan_and_letter_without_ansi() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.args(offline_run_args());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Rebalancing plan"))
        .stdout(predicate::str::contains("PETR4"))
        .stdout(predicate::str::contains("R$ 12.345,00"))
        .stdout(predicate::str::contains("R$ 31.655,00"))
        .stdout(predicate::str::contains("AVISO LEGAL"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn offline_run_json_reports_state() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &offline_run_args()).expect("json run");

    let actions = value["plan"]["actions"].as_array().expect("actions array");
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0]["symbol"], "PETR4");
    assert_eq!(actions[0]["rule"], "trim");
    assert_eq!(value["compliance_report"]["passed"], true);
    assert!(value["letter"]["sanitized_text"]
        .as_str()
        .unwrap_or_default()
        .contains("AVISO LEGAL"));
    assert_eq!(value["input_digest"].as_str().map(str::len), Some(64));
}

#[test]
fn run_writes_letter_to_output_file() {
    let home = setup_temp_home();
    let out = home.path().join("carta.txt");

    let mut args: Vec<&str> = offline_run_args();
    let out_str = out.to_string_lossy().to_string();
    args.extend(["--output", out_str.as_str()]);
    run_cmd(&home, &args).expect("run with output");

    let letter = std::fs::read_to_string(&out).expect("letter written");
    assert!(letter.starts_with("São Paulo,"));
    assert!(letter.contains("AVISO LEGAL"));
}

#[test]
fn run_exports_letter_as_pdf() {
    let home = setup_temp_home();
    let pdf = home.path().join("cartas").join("carta.pdf");

    let mut args: Vec<&str> = offline_run_args();
    let pdf_str = pdf.to_string_lossy().to_string();
    args.extend(["--pdf", pdf_str.as_str()]);
    let output = run_cmd(&home, &args).expect("run with pdf");

    let bytes = std::fs::read(&pdf).expect("pdf written");
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(String::from_utf8_lossy(&output.stdout).contains("PDF written to"));
}

#[test]
fn run_without_api_key_suggests_offline() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.args([
        "run",
        "--portfolio",
        PORTFOLIO,
        "--risk",
        RISK,
        "--macro",
        MACRO,
        "--prices",
        PRICES,
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--offline"));
}

#[test]
fn run_with_missing_input_file_fails() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.args([
        "run",
        "--portfolio",
        "tests/fixtures/does_not_exist.txt",
        "--risk",
        RISK,
        "--macro",
        MACRO,
        "--prices",
        PRICES,
        "--offline",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read portfolio statement"));
}

#[test]
fn check_letter_removes_forbidden_terms() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.args(["check-letter", LETTER]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("PASSED"))
        .stdout(predicate::str::contains("Terms removed:"))
        .stdout(predicate::str::contains("AVISO LEGAL"))
        .stdout(predicate::str::contains("Nossa estratégia oferece retorno garantido").not());
}

#[test]
fn check_letter_json_lists_violations() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["check-letter", LETTER]).expect("json check");

    let violations = value["report"]["violations_found"]
        .as_array()
        .expect("violations array");
    assert!(violations.len() >= 2);
    assert_eq!(value["letter"]["disclaimer_appended"], true);
}

#[test]
fn config_prints_effective_toml() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[compliance]"))
        .stdout(predicate::str::contains("AVISO LEGAL"))
        .stdout(predicate::str::contains("[[strategy.rules]]"));
}

#[test]
fn explicit_config_file_is_used() {
    let home = setup_temp_home();
    let config_path = home.path().join("advisor.toml");
    std::fs::write(
        &config_path,
        "[risk]\ndrift_tolerance_pct = 20\n",
    )
    .expect("write config");

    let mut cmd = base_cmd(&home);
    cmd.arg("--config").arg(&config_path).arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("drift_tolerance_pct = \"20\"").or(
            predicate::str::contains("drift_tolerance_pct = 20"),
        ));
}
