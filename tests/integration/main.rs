//! Integration tests for regcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn regcache() -> Command {
        cargo_bin_cmd!("regcache")
    }

    /// Command bound to a config file whose cache and scratch live in `temp`
    fn regcache_in(temp: &Path) -> Command {
        let config = temp.join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[cache]\nroot = {:?}\nscratch_dir = {:?}\n",
                temp.join("cache"),
                temp.join("scratch")
            ),
        )
        .unwrap();

        let mut cmd = regcache();
        cmd.arg("--config").arg(config);
        cmd
    }

    #[test]
    fn help_displays() {
        regcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build definition and README cache"));
    }

    #[test]
    fn version_displays() {
        regcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("regcache"));
    }

    #[test]
    fn config_path() {
        regcache()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        regcache_in(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("build_definition_name"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        regcache()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();

        assert!(path.exists());
    }

    #[test]
    fn invalid_subcommand() {
        regcache().arg("nonexistent").assert().failure();
    }

    #[test]
    fn show_missing_slot_fails() {
        let temp = TempDir::new().unwrap();
        regcache_in(temp.path())
            .args(["show", "nginx", "1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache slot not populated"));
    }

    #[test]
    fn show_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        regcache_in(temp.path())
            .args(["show", "..", "1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache key component"));
    }

    #[test]
    fn sync_missing_manifest_fails() {
        let temp = TempDir::new().unwrap();
        regcache_in(temp.path())
            .args(["sync", "does-not-exist.toml"])
            .assert()
            .failure();
    }

    #[test]
    fn sync_invalid_manifest_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("projects.toml");
        std::fs::write(&manifest, "[[project]]\njob_id = \"nginx\"\n").unwrap();

        regcache_in(temp.path())
            .arg("sync")
            .arg(&manifest)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid descriptor manifest"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn sync_unreachable_source_installs_placeholder() {
        let temp = TempDir::new().unwrap();
        let missing_repo = temp.path().join("no-such-repo");
        let manifest = temp.path().join("projects.toml");
        std::fs::write(
            &manifest,
            format!(
                r#"
[[project]]
app_id = "centos"
job_id = "nginx"
tag = "1.0"
git_url = "file://{}"
build_number = 42

[[project]]
job_id = "httpd"
tag = "latest"
git_url = "file://{}"
pre_build_requested = true
build_number = "7"
"#,
                missing_repo.display(),
                missing_repo.display()
            ),
        )
        .unwrap();

        regcache_in(temp.path())
            .arg("sync")
            .arg(&manifest)
            .args(["--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("centos/nginx:1.0\t42\tfallback"))
            .stdout(predicate::str::contains("httpd:latest\t7\tfallback"));

        let cache = temp.path().join("cache");
        let nginx = std::fs::read_to_string(cache.join("centos/nginx/1.0/Dockerfile")).unwrap();
        assert!(nginx.contains("does not exist"));
        let watermark = std::fs::read_to_string(cache.join("centos/nginx/1.0/BuildNumber")).unwrap();
        assert_eq!(watermark.trim(), "42");

        let httpd = std::fs::read_to_string(cache.join("httpd/latest/Dockerfile")).unwrap();
        assert!(httpd.contains("Pre-build"));

        // Second run with unchanged build numbers leaves the slots fresh
        regcache_in(temp.path())
            .arg("sync")
            .arg(&manifest)
            .args(["--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"fresh\""));

        regcache_in(temp.path())
            .args(["show", "nginx", "1.0", "--app", "centos"])
            .assert()
            .success()
            .stdout(predicate::str::contains("does not exist"));
    }

    #[test]
    fn index_from_local_dir_reports_unsupported_hosts() {
        let temp = TempDir::new().unwrap();
        let index_dir = temp.path().join("index.d");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(
            index_dir.join("example.yaml"),
            r#"
Projects:
  - id: 1
    app-id: example
    job-id: tool
    git-url: https://bitbucket.org/example/tool
    git-path: /
    git-branch: master
    target-file: Dockerfile
    desired-tag: latest
    notify-email: ops@example.org
    depends-on: centos/centos:7
"#,
        )
        .unwrap();
        std::fs::write(index_dir.join("index_template.yaml"), "Projects: {").unwrap();

        regcache_in(temp.path())
            .arg("index")
            .arg("--dir")
            .arg(&index_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"job-id\": \"tool\""))
            .stdout(predicate::str::contains("\"build_definition\": null"));
    }
}
