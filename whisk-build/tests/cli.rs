//! End-to-end tests that drive the `whisk-build` binary against a stand-in container runtime.
//!
//! The stand-in is a shell script that appends its arguments to a log file and answers `-v` with a
//! configurable version string, so these tests only run on Unix.

#![cfg(unix)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use tempfile::TempDir;

const FAKE_DOCKER: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_DOCKER_LOG"
case "$1" in
  -v)
    if [ -n "$FAKE_DOCKER_HANG_VERSION" ]; then
      exec sleep 30
    fi
    echo "${FAKE_DOCKER_VERSION:-Docker version 24.0.7, build afdd53b}"
    ;;
  build)
    if [ -n "$FAKE_DOCKER_HANG" ]; then
      exec sleep 30
    fi
    if [ -n "$FAKE_DOCKER_FAIL_BUILD" ]; then
      exit 1
    fi
    ;;
esac
exit 0
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("fake-docker");
        fs::write(&binary, FAKE_DOCKER).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        Fixture { dir }
    }

    fn binary(&self) -> PathBuf {
        self.dir.path().join("fake-docker")
    }

    fn log(&self) -> PathBuf {
        self.dir.path().join("invocations.log")
    }

    /// The invocations of the stand-in so far, one per line.
    fn invocations(&self) -> Vec<String> {
        match fs::read_to_string(self.log()) {
            Ok(content) => content.lines().map(str::to_owned).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// A copy of the invoker fixture that tests are free to modify.
    fn source_dir(&self) -> PathBuf {
        let source = self.dir.path().join("invoker");
        fs::create_dir_all(&source).unwrap();
        for entry in fs::read_dir(invoker_fixture()).unwrap() {
            let entry = entry.unwrap();
            fs::copy(entry.path(), source.join(entry.file_name())).unwrap();
        }
        source.canonicalize().unwrap()
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("whisk-build");
        cmd.env("FAKE_DOCKER_LOG", self.log())
            .env("RUST_LOG", "info")
            .arg("--binary")
            .arg(self.binary());
        cmd
    }
}

fn invoker_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/invoker")
}

#[test]
fn help_lists_actions() {
    cargo_bin_cmd!("whisk-build")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build-coverage"))
        .stdout(predicate::str::contains("push"));
}

#[test]
fn build_without_registry_tags_but_does_not_push() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .args(["--image-name", "invoker", "--source-dir"])
        .arg(&source)
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("no registry configured"));

    assert_eq!(
        fixture.invocations(),
        [
            format!(
                "build -f {} -t invoker {}",
                source.join("Dockerfile").display(),
                source.display()
            ),
            "-v".to_owned(),
            "tag invoker whisk/invoker:latest".to_owned(),
        ]
    );
}

#[test]
fn build_with_registry_on_legacy_docker() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .env("FAKE_DOCKER_VERSION", "Docker version 1.11.2, build b9f10c9")
        .args([
            "build",
            "--image-name",
            "invoker",
            "--registry",
            "myregistry",
            "--prefix",
            "openwhisk",
            "--tag",
            "nightly",
            "--build-arg",
            "VERSION=1",
            "--source-dir",
        ])
        .arg(&source)
        .assert()
        .success();

    let invocations = fixture.invocations();
    assert_eq!(invocations.len(), 4);
    assert!(invocations[0].starts_with("build --build-arg VERSION=1 -f "));
    assert_eq!(invocations[1], "-v");
    assert_eq!(
        invocations[2],
        "tag -f invoker myregistry/openwhisk/invoker:nightly"
    );
    assert_eq!(invocations[3], "push myregistry/openwhisk/invoker:nightly");
}

#[test]
fn multi_arch_build_uses_buildx() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .args(["--image-name", "invoker", "--multi-arch", "--source-dir"])
        .arg(&source)
        .arg("build")
        .assert()
        .success();

    assert_eq!(
        fixture.invocations()[0],
        format!(
            "buildx build --build-arg BASE=whisk/scala:latest -f {} -t invoker {} --load",
            source.join("Dockerfile").display(),
            source.display()
        )
    );
}

#[test]
fn failing_build_is_retried_then_aborts() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .env("FAKE_DOCKER_FAIL_BUILD", "1")
        .args(["--image-name", "invoker", "--retries", "2", "--source-dir"])
        .arg(&source)
        .arg("build")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("1 retries left, retrying"))
        .stderr(predicate::str::contains("failed with exit code `1`"));

    let invocations = fixture.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations.iter().all(|line| line.starts_with("build ")));
}

#[test]
fn hung_build_is_killed() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .env("FAKE_DOCKER_HANG", "1")
        .args([
            "--image-name",
            "invoker",
            "--retries",
            "1",
            "--timeout",
            "1",
            "--source-dir",
        ])
        .arg(&source)
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("was killed after 1 seconds"));
}

#[test]
fn unparsable_version_fails_tag() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .env("FAKE_DOCKER_VERSION", "not a version")
        .args(["tag", "--image-name", "invoker"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "unable to determine the container runtime version",
        ));

    assert_eq!(fixture.invocations(), ["-v"]);
}

#[test]
fn hung_version_query_times_out() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .env("FAKE_DOCKER_HANG_VERSION", "1")
        .args(["tag", "--image-name", "invoker", "--timeout", "1"])
        .timeout(Duration::from_secs(20))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("did not finish within 1s"));

    assert_eq!(fixture.invocations(), ["-v"]);
}

#[test]
fn build_args_keep_commas_and_order() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();

    fixture
        .cmd()
        .env("WHISK_BUILD_ARGS", "A=1,B=2")
        .args([
            "--image-name",
            "invoker",
            "--build-arg",
            "JAVA_OPTS=-Xmx1g,-Xms512m",
            "--source-dir",
        ])
        .arg(&source)
        .arg("build")
        .assert()
        .success();

    assert!(fixture.invocations()[0].starts_with(
        "build --build-arg A=1 --build-arg B=2 --build-arg JAVA_OPTS=-Xmx1g,-Xms512m -f "
    ));
}

#[test]
fn missing_image_name_runs_nothing() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .env_remove("WHISK_IMAGE_NAME")
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no image name configured"));

    assert!(fixture.invocations().is_empty());
}

#[test]
fn configuration_from_environment() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .env("WHISK_IMAGE_NAME", "controller")
        .env("WHISK_REGISTRY", "localhost:5000")
        .env("WHISK_IMAGE_TAG", "v2")
        .arg("push")
        .assert()
        .success();

    assert_eq!(
        fixture.invocations(),
        [
            "-v",
            "tag controller localhost:5000/whisk/controller:v2",
            "push localhost:5000/whisk/controller:v2",
        ]
    );
}

#[test]
fn build_coverage_stages_artifacts_and_tags() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();
    let artifacts = fixture.dir.path().join("artifacts");
    fs::create_dir_all(artifacts.join("classes")).unwrap();
    fs::write(artifacts.join("classes/Invoker.class"), "class").unwrap();
    fs::write(artifacts.join("jacocoagent.jar"), "agent").unwrap();

    fixture
        .cmd()
        .args(["--image-name", "invoker", "--source-dir"])
        .arg(&source)
        .arg("build-coverage")
        .arg("--artifacts")
        .arg(&artifacts)
        .assert()
        .success();

    assert_eq!(
        fixture.invocations(),
        [
            format!(
                "build -f {} -t invoker-cov {}",
                source.join("Dockerfile.cov").display(),
                source.display()
            ),
            "-v".to_owned(),
            "tag invoker-cov whisk/invoker:cov".to_owned(),
        ]
    );
    let staging = source.join("build/tmp/docker-coverage");
    assert!(staging.join("classes/Invoker.class").is_file());
    assert!(staging.join("jacocoagent.jar").is_file());
}

#[test]
fn build_coverage_from_build_dir_of_source() {
    let fixture = Fixture::new();
    let source = fixture.source_dir();
    let build = source.join("build");
    fs::create_dir_all(build.join("distributions")).unwrap();
    fs::write(build.join("distributions/invoker.tar"), "tar").unwrap();

    fixture
        .cmd()
        .args(["--image-name", "invoker", "--source-dir"])
        .arg(&source)
        .arg("build-coverage")
        .arg("--artifacts")
        .arg(&build)
        .timeout(Duration::from_secs(60))
        .assert()
        .success();

    let staging = source.join("build/tmp/docker-coverage");
    assert!(staging.join("distributions/invoker.tar").is_file());
    assert!(!staging.join("tmp/docker-coverage").exists());
}
