use assert_cmd::Command;
use predicates::prelude::*;

const ENV_VARS: &[&str] = &[
    "GLM_CONFIG",
    "S3_BUCKET",
    "S3_USE_S3",
    "S3_OVERRIDE_URL",
    "S3_OVERRIDE_SUFFIX",
    "S3_KEEP_LOCAL",
    "GITLAB_TOKEN",
];

fn glm() -> Command {
    let mut cmd = Command::cargo_bin("glm").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_key_prints_relocation_key() {
    glm()
        .args(["key", "/uploads/abc/file.png"])
        .assert()
        .success()
        .stdout("29d03ca921657e76fc9035cfe03713c879ff33717fa42b19ad5c70f7162eaa80/file.png\n");
}

#[test]
fn test_scan_lists_references() {
    glm()
        .arg("scan")
        .write_stdin("Intro ![shot](/uploads/a/s.png) and [log](/uploads/b/build.log)")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""kind":"image""#)
                .and(predicate::str::contains(r#""path":"/uploads/a/s.png""#))
                .and(predicate::str::contains(r#""label":"log""#))
                .and(predicate::str::contains(r#""offset":6"#)),
        );
}

#[test]
fn test_rewrite_stdin_without_store() {
    glm()
        .arg("rewrite")
        .env("GITLAB_URL", "https://gitlab.example.com")
        .env("GITLAB_PROJECT_PATH", "group/proj")
        .write_stdin("See ![shot](/uploads/abc/file.png) and [doc](https://example.com)")
        .assert()
        .success()
        .stdout(
            "See ![shot](https://gitlab.example.com/group/proj/uploads/abc/file.png) \
             and [doc](https://example.com)",
        );
}

#[test]
fn test_rewrite_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("issue.md");
    std::fs::write(&file, "[log](/uploads/x/build.log)\n").unwrap();

    glm()
        .arg("rewrite")
        .arg(&file)
        .arg("--in-place")
        .env("GITLAB_URL", "https://gitlab.example.com/")
        .env("GITLAB_PROJECT_PATH", "group/proj")
        .assert()
        .success()
        .stdout("");

    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "[log](https://gitlab.example.com/group/proj/uploads/x/build.log)\n"
    );
}

#[test]
fn test_rewrite_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("glm.toml");
    std::fs::write(
        &config,
        "[gitlab]\nurl = \"https://git.internal\"\nproject_path = \"team/app\"\n",
    )
    .unwrap();

    glm()
        .args(["rewrite", "--config"])
        .arg(&config)
        .write_stdin("[a](/uploads/k/a.txt)")
        .assert()
        .success()
        .stdout("[a](https://git.internal/team/app/uploads/k/a.txt)");
}

#[test]
fn test_rewrite_requires_configuration() {
    glm()
        .arg("rewrite")
        .env_remove("GITLAB_URL")
        .env_remove("GITLAB_PROJECT_PATH")
        .write_stdin("[a](/uploads/k/a.txt)")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITLAB_URL"));
}
