use std::process::{Command, Output};

fn run(bin: &str, args: &[&str]) -> Output {
    Command::new(bin)
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .output()
        .expect("sample binary runs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_arguments_print_usage_and_exit_one() {
    for bin in [
        env!("CARGO_BIN_EXE_test_generator"),
        env!("CARGO_BIN_EXE_test_data_generator"),
        env!("CARGO_BIN_EXE_log_analyzer"),
        env!("CARGO_BIN_EXE_api_spec_analyzer"),
        env!("CARGO_BIN_EXE_browser_agent"),
        env!("CARGO_BIN_EXE_system_message"),
    ] {
        let output = run(bin, &[]);
        assert_eq!(output.status.code(), Some(1), "{bin}");
        assert!(stdout(&output).contains("Usage:"), "{bin}");
    }
}

#[test]
fn help_exits_zero() {
    let output = run(env!("CARGO_BIN_EXE_hello"), &["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("--model"));
}

#[test]
fn invalid_system_message_mode_is_a_usage_error() {
    let output = run(env!("CARGO_BIN_EXE_system_message"), &["prepend"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn out_of_range_count_fails_before_any_request() {
    let output = run(
        env!("CARGO_BIN_EXE_test_data_generator"),
        &["user", "json", "5000"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("between 1 and 1000"));
}

#[test]
fn missing_source_file_fails_before_any_request() {
    let output = run(env!("CARGO_BIN_EXE_test_generator"), &["/no/such/source.rs"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("file not found"));
}

#[test]
fn code_review_outside_a_repository_has_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_code_review"))
        .current_dir(dir.path())
        .env_remove("ANTHROPIC_API_KEY")
        .output()
        .expect("code_review runs");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("No changes to review"));
}
