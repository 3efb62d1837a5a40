//! Integration tests for fnstage

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn fnstage() -> Command {
        cargo_bin_cmd!("fnstage")
    }

    #[test]
    fn help_displays() {
        fnstage()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("function invoker staging"));
    }

    #[test]
    fn version_displays() {
        fnstage()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("fnstage"));
    }

    #[test]
    fn supply_requires_directories() {
        fnstage()
            .args(["supply", "/tmp"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("required"));
    }
}

mod staging_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
language = "nodejs-fn"

[[dependencies]]
name = "node-function-invoker"
version = "0.0.8"
uri = "dependencies/node-function-invoker-0.0.8"

[[default_versions]]
name = "node-function-invoker"
version = "0.0.8"
"#;

    const CONFIG: &str = r#"
[installer]
program = "sh"
install_args = ["-c", "mkdir -p node_modules/dep && echo dep > node_modules/dep/index.js && echo install >> calls.log"]
rebuild_args = ["-c", "echo rebuild >> calls.log"]
"#;

    /// Buildpack, app, cache and deps dirs for one staging run
    struct Staging {
        _temp: TempDir,
        buildpack: PathBuf,
        app: PathBuf,
        cache: PathBuf,
        deps: PathBuf,
    }

    impl Staging {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().to_path_buf();
            let buildpack = root.join("buildpack");
            let app = root.join("app");
            let cache = root.join("cache");
            let deps = root.join("deps");

            let invoker = buildpack.join("dependencies/node-function-invoker-0.0.8");
            fs::create_dir_all(&invoker).unwrap();
            fs::write(invoker.join("server.js"), "// invoker").unwrap();
            fs::create_dir_all(buildpack.join("profile.d")).unwrap();
            fs::write(buildpack.join("profile.d/node.sh"), "export NODE_HOME=/node\n").unwrap();
            fs::write(buildpack.join("manifest.toml"), MANIFEST).unwrap();
            fs::write(buildpack.join("fnstage.toml"), CONFIG).unwrap();

            fs::create_dir_all(&app).unwrap();
            fs::write(app.join("package.json"), r#"{"dependencies":{"dep":"1"}}"#).unwrap();
            fs::create_dir_all(&cache).unwrap();
            fs::create_dir_all(&deps).unwrap();

            Self {
                _temp: temp,
                buildpack,
                app,
                cache,
                deps,
            }
        }

        fn run(&self, stage: &str) -> assert_cmd::assert::Assert {
            let mut cmd: Command = cargo_bin_cmd!("fnstage");
            cmd.env_remove("FNSTAGE_CONFIG")
                .arg("--buildpack-dir")
                .arg(&self.buildpack)
                .arg(stage)
                .arg(&self.app)
                .arg(&self.cache)
                .arg(&self.deps)
                .arg("0")
                .assert()
        }

        fn slot(&self) -> PathBuf {
            self.deps.join("0")
        }

        fn calls(&self) -> String {
            fs::read_to_string(self.app.join("calls.log")).unwrap_or_default()
        }

        /// Live cache entry, found through the `current` pointer
        fn entry(&self) -> serde_json::Value {
            let root = self.cache.join("fn-deps");
            let live = fs::read_to_string(root.join("current")).unwrap();
            let content = fs::read_to_string(root.join(live.trim()).join("entry.json")).unwrap();
            serde_json::from_str(&content).unwrap()
        }
    }

    /// Relative path and bytes of every file under `root`, sorted
    fn tree_contents(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let relative = path.strip_prefix(root).unwrap().to_path_buf();
                    files.push((relative, fs::read(&path).unwrap()));
                }
            }
        }
        files.sort();
        files
    }

    fn write_dotfile_archive(dir: &Path) -> PathBuf {
        let src = dir.join("archive-src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join(".hidden"), "x").unwrap();
        let archive = dir.join("dependencies/invoker.tar");
        let status = std::process::Command::new("tar")
            .arg("-cf")
            .arg(&archive)
            .arg("-C")
            .arg(&src)
            .arg(".hidden")
            .status()
            .unwrap();
        assert!(status.success());
        archive
    }

    #[test]
    fn supply_installs_invoker_and_builds() {
        let s = Staging::new();
        s.run("supply")
            .success()
            .stdout(predicate::str::contains("-----> Installing invoker"));

        assert_eq!(
            fs::read_to_string(s.slot().join("invoker/server.js")).unwrap(),
            "// invoker"
        );
        assert_eq!(
            fs::read_to_string(s.slot().join("profile.d/fn.sh")).unwrap(),
            "export HOST=0.0.0.0\n\
             export HTTP_PORT=${HTTP_PORT:8080}\n\
             export GRPC_PORT=${GRPC_PORT:10382}\n\
             export INVOKER_DIR=\"$DEPS_DIR/0/invoker\"\n"
        );
        assert_eq!(s.calls(), "install\n");
        assert!(s.app.join("node_modules/dep/index.js").is_file());
        assert!(s.entry()["fingerprint"].is_string());

        let config = fs::read_to_string(s.slot().join("config.toml")).unwrap();
        assert!(config.contains("name = \"nodejs-fn\""));
        assert!(config.contains("deps_idx = \"0\""));
    }

    #[test]
    fn second_supply_rebuilds_from_cache() {
        let s = Staging::new();
        s.run("supply").success();
        let first_tree = tree_contents(&s.app.join("node_modules"));
        let first_invoker = tree_contents(&s.slot().join("invoker"));
        let first_fingerprint = s.entry()["fingerprint"].clone();
        fs::remove_dir_all(s.app.join("node_modules")).unwrap();

        s.run("supply")
            .success()
            .stdout(predicate::str::contains("Prebuild detected"));

        assert_eq!(s.calls(), "install\nrebuild\ninstall\n");
        assert!(!first_tree.is_empty());
        assert_eq!(tree_contents(&s.app.join("node_modules")), first_tree);
        assert_eq!(tree_contents(&s.slot().join("invoker")), first_invoker);
        assert_eq!(s.entry()["fingerprint"], first_fingerprint);
    }

    #[test]
    fn changed_declarations_install_cold() {
        let s = Staging::new();
        s.run("supply").success();
        fs::write(s.app.join("package.json"), r#"{"dependencies":{"dep":"2"}}"#).unwrap();

        s.run("supply").success();
        assert_eq!(s.calls(), "install\ninstall\n");
    }

    #[test]
    fn installer_failure_exits_with_stage_code() {
        let s = Staging::new();
        fs::write(
            s.buildpack.join("fnstage.toml"),
            "[installer]\nprogram = \"sh\"\ninstall_args = [\"-c\", \"echo boom; exit 3\"]\n",
        )
        .unwrap();

        s.run("supply")
            .code(14)
            .stderr(predicate::str::contains("exited with code 3"));
        assert!(!s.cache.join("fn-deps/current").exists());
    }

    #[test]
    fn empty_invoker_archive_is_missing_artifact() {
        let s = Staging::new();
        let archive = write_dotfile_archive(&s.buildpack);
        let manifest = format!(
            "[[dependencies]]\nname = \"node-function-invoker\"\nversion = \"0.0.8\"\nuri = \"{}\"\n",
            archive.display()
        );
        fs::write(s.buildpack.join("manifest.toml"), manifest).unwrap();

        s.run("supply")
            .code(14)
            .stderr(predicate::str::contains("invoker not found in specified dependency"));
    }

    #[test]
    fn invalid_manifest_exits_with_catalog_code() {
        let s = Staging::new();
        fs::write(s.buildpack.join("manifest.toml"), "[[dependencies]\n").unwrap();
        s.run("supply").code(10);
    }

    #[test]
    fn invalid_config_exits_with_config_code() {
        let s = Staging::new();
        fs::write(s.buildpack.join("fnstage.toml"), "[installer\n").unwrap();
        s.run("supply").code(16);
    }

    #[test]
    fn missing_build_dir_exits_with_layout_code() {
        let s = Staging::new();
        fs::remove_dir_all(&s.app).unwrap();
        s.run("supply").code(11);
    }

    #[test]
    fn malformed_override_exits_with_override_code() {
        let s = Staging::new();
        let slot = s.deps.join("1");
        fs::create_dir_all(&slot).unwrap();
        fs::write(slot.join("override.toml"), "[nodejs-fn\n").unwrap();
        s.run("supply")
            .code(17)
            .stderr(predicate::str::contains("override.toml"));
    }

    #[test]
    fn override_redirects_invoker_source() {
        let s = Staging::new();
        let mirror = s.buildpack.join("mirror/node-function-invoker-0.0.8");
        fs::create_dir_all(&mirror).unwrap();
        fs::write(mirror.join("server.js"), "// mirrored").unwrap();
        let slot = s.deps.join("1");
        fs::create_dir_all(&slot).unwrap();
        fs::write(
            slot.join("override.toml"),
            "[[nodejs-fn.dependencies]]\nname = \"node-function-invoker\"\nversion = \"0.0.8\"\nuri = \"mirror/node-function-invoker-0.0.8\"\n",
        )
        .unwrap();

        s.run("supply").success();
        assert_eq!(
            fs::read_to_string(s.slot().join("invoker/server.js")).unwrap(),
            "// mirrored"
        );
    }

    #[test]
    fn failing_hook_exits_with_before_compile_code() {
        let s = Staging::new();
        fs::write(
            s.buildpack.join("fnstage.toml"),
            "[hooks]\nbefore_compile = \"exit 1\"\n",
        )
        .unwrap();
        s.run("supply").code(12);
    }

    #[test]
    fn finalize_publishes_profile_scripts() {
        let s = Staging::new();
        s.run("finalize").success();

        assert_eq!(
            fs::read_to_string(s.slot().join("profile.d/node.sh")).unwrap(),
            "export NODE_HOME=/node\n"
        );
        // Rerunning overwrites in place
        s.run("finalize").success();
    }

    #[test]
    fn finalize_without_profile_dir_fails() {
        let s = Staging::new();
        fs::remove_dir_all(s.buildpack.join("profile.d")).unwrap();
        s.run("finalize").code(14);
    }

    #[test]
    fn cache_info_and_clear() {
        let s = Staging::new();
        s.run("supply").success();

        let mut info: Command = cargo_bin_cmd!("fnstage");
        info.env_remove("FNSTAGE_CONFIG")
            .arg("--buildpack-dir")
            .arg(&s.buildpack)
            .args(["cache", "info", "--format", "json", "--cache-dir"])
            .arg(&s.cache)
            .arg("--build-dir")
            .arg(&s.app)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"would_hit\": true"));

        let mut clear: Command = cargo_bin_cmd!("fnstage");
        clear
            .env_remove("FNSTAGE_CONFIG")
            .arg("--buildpack-dir")
            .arg(&s.buildpack)
            .args(["cache", "clear", "--cache-dir"])
            .arg(&s.cache)
            .assert()
            .success();
        assert!(!s.cache.join("fn-deps").exists());
    }
}
