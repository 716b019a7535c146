//! Integration tests for Coon

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn coon() -> Command {
        cargo_bin_cmd!("coon")
    }

    /// Config with every directory inside `temp`
    fn write_config(temp: &Path) -> PathBuf {
        write_config_named(temp, "config.toml", "local")
    }

    /// Config sharing the `remote` cache but with its own local store
    fn write_config_named(temp: &Path, file: &str, local: &str) -> PathBuf {
        let path = temp.join(file);
        std::fs::create_dir_all(temp.join("remote")).unwrap();
        let config = format!(
            "temp_dir = {:?}\nruntime = \"26\"\n\n[[cache]]\nname = \"local_cache\"\ntype = \"local\"\nurl = {:?}\n\n[[cache]]\nname = \"shared\"\ntype = \"filesystem-remote\"\nurl = {:?}\n",
            temp.join("tmp").display().to_string(),
            temp.join(local).display().to_string(),
            temp.join("remote").display().to_string(),
        );
        std::fs::write(&path, config).unwrap();
        path
    }

    fn create_project(temp: &Path, name: &str) -> PathBuf {
        coon()
            .arg("-C")
            .arg(temp)
            .args(["create", name])
            .assert()
            .success();
        temp.join(name)
    }

    #[test]
    fn help_displays() {
        coon()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("package manager"));
    }

    #[test]
    fn version_displays() {
        coon()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("coon"));
    }

    #[test]
    fn create_writes_manifest() {
        let temp = TempDir::new().unwrap();
        let project = create_project(temp.path(), "demo");

        let manifest = std::fs::read_to_string(project.join("coon.toml")).unwrap();
        assert!(manifest.contains("name = \"demo\""));
        assert!(project.join("src").is_dir());
    }

    #[test]
    fn create_twice_fails() {
        let temp = TempDir::new().unwrap();
        create_project(temp.path(), "demo");

        coon()
            .arg("-C")
            .arg(temp.path())
            .args(["create", "demo"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already contains a project"));
    }

    #[test]
    fn populate_without_dependencies() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .arg("populate")
            .assert()
            .success()
            .stdout(predicate::str::contains("No dependencies"));
    }

    #[test]
    fn populate_outside_project_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(temp.path())
            .arg("populate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("coon create"));
    }

    #[test]
    fn package_without_outputs_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .arg("package")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to package demo"));
    }

    #[test]
    fn package_publish_and_list_versions() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");
        std::fs::create_dir_all(project.join("ebin")).unwrap();
        std::fs::write(project.join("ebin/demo.beam"), b"beam").unwrap();

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .arg("package")
            .assert()
            .success();
        assert!(project.join("demo.cp").is_file());

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .args(["publish", "shared"])
            .assert()
            .success();

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .args(["versions", "shared", "_/demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("master"));
    }

    #[test]
    fn fetch_installs_published_package() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");
        std::fs::create_dir_all(project.join("ebin")).unwrap();
        std::fs::write(project.join("ebin/demo.beam"), b"beam").unwrap();

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .args(["publish", "shared"])
            .assert()
            .success();

        let consumer_config = write_config_named(temp.path(), "consumer.toml", "consumer-local");
        let consumer = temp.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();

        coon()
            .arg("-c")
            .arg(&consumer_config)
            .arg("-C")
            .arg(&consumer)
            .args(["fetch", "_/demo", "master"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Fetched _/demo@master"));

        assert!(temp
            .path()
            .join("consumer-local/demo/master/26/demo.cp")
            .is_file());
    }

    #[test]
    fn publish_to_unknown_backend_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .args(["add", "nowhere"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown cache backend: nowhere"));
    }

    #[test]
    fn versions_rejects_unqualified_name() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        let project = create_project(temp.path(), "demo");

        coon()
            .arg("-c")
            .arg(&config)
            .arg("-C")
            .arg(&project)
            .args(["versions", "shared", "comtihon/"])
            .assert()
            .failure();
    }
}
