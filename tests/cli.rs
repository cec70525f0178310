use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn help_lists_the_subcommands() {
    let output = Command::cargo_bin("faultgate")
        .expect("binary present")
        .arg("--help")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("train"));
    assert!(stdout.contains("predict"));
    assert!(stdout.contains("validate-config"));
}

#[test]
fn predict_without_a_promoted_model_reports_unavailability() {
    let temp = tempdir().unwrap();
    let schema_path = temp.path().join("schema.yaml");
    std::fs::write(
        &schema_path,
        "columns: [s1, class]\nnumerical_columns: [s1]\ntarget_column: class\n",
    )
    .unwrap();
    let config_path = temp.path().join("pipeline.yaml");
    std::fs::write(
        &config_path,
        format!(
            "schema_path: {}\nsaved_model_dir: {}\n",
            schema_path.display(),
            temp.path().join("saved_models").display()
        ),
    )
    .unwrap();
    let input_path = temp.path().join("input.csv");
    std::fs::write(&input_path, "s1\n1.0\n").unwrap();

    let output = Command::cargo_bin("faultgate")
        .expect("binary present")
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "predict",
            input_path.to_str().unwrap(),
        ])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("Model is unavailable"));
}

#[test]
fn validate_config_rejects_a_broken_split_ratio() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("pipeline.yaml");
    std::fs::write(&config_path, "train_test_split_ratio: 2.0\n").unwrap();

    Command::cargo_bin("faultgate")
        .expect("binary present")
        .args(["--config", config_path.to_str().unwrap(), "validate-config"])
        .assert()
        .failure();
}
