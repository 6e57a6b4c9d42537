use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.xdg_config.join("plexcord/config.json")
    }

    fn write_config(&self, contents: &str) {
        let path = self.config_path();
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config directory");
        fs::write(path, contents).expect("failed to write config");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("plexcord"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute plexcord: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "plexcord {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn status_creates_default_config_and_prints_hint() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("plexcord Configuration"));
    assert!(stdout.contains("Remaining time:  true"));
    assert!(
        stdout.contains("No users configured"),
        "expected setup hint, got:\n{stdout}"
    );

    let written = fs::read_to_string(env.config_path()).expect("config should be created");
    assert!(written.contains("\t\"display\""));
    assert!(written.ends_with('\n'));
}

#[test]
fn status_masks_tokens_and_lists_servers() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"{
            "display": {"useRemainingTime": false},
            "users": [{
                "token": "abcdefghijklmnop",
                "servers": [{
                    "name": "Living Room",
                    "listenForUser": "bob",
                    "blacklistedLibraries": ["Home Videos", "Audiobooks"]
                }]
            }]
        }"#,
    );

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Remaining time:  false"));
    assert!(stdout.contains("abcd****"));
    assert!(!stdout.contains("abcdefghijklmnop"));
    assert!(stdout.contains("Server:        Living Room"));
    assert!(stdout.contains("Listen for:  bob"));
    assert!(stdout.contains("Blacklist:   Audiobooks, Home Videos"));
    assert!(!stdout.contains("Whitelist"));
}

#[test]
fn corrupt_config_is_quarantined() {
    let env = CliTestEnv::new();
    env.write_config("{ not json");

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let config_dir = env.config_path().parent().unwrap().to_path_buf();
    let quarantined: Vec<_> = fs::read_dir(&config_dir)
        .expect("config dir should exist")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("config-") && name.ends_with(".json"))
        .collect();
    assert_eq!(quarantined.len(), 1, "expected one quarantined file");

    let fresh = fs::read_to_string(env.config_path()).expect("config should be rewritten");
    assert!(fresh.contains("useRemainingTime"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to parse the config file"),
        "expected a parse error on stderr, got:\n{stderr}"
    );
    assert!(stderr.contains(&quarantined[0]));
}

#[test]
fn run_reports_quarantined_config_before_exiting() {
    let env = CliTestEnv::new();
    let custom = env.home.join("config.json");
    fs::write(&custom, "{ not json").expect("failed to write config");

    let args = ["--config", custom.to_str().unwrap(), "run"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No users configured"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to parse the config file"),
        "expected a parse error on stderr, got:\n{stderr}"
    );
    assert!(stderr.contains("config-"));
}

#[test]
fn config_flag_overrides_default_path() {
    let env = CliTestEnv::new();
    let custom = env.home.join("custom.json");

    let args = ["--config", custom.to_str().unwrap(), "status"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    assert!(custom.exists());
    assert!(!env.config_path().exists());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(custom.to_str().unwrap()));
}

#[test]
fn run_without_users_exits_cleanly() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &[]);
    assert_success(&[], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No users configured"));
}
