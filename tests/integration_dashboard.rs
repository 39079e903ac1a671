use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SETTING_KEYS: &[&str] = &[
    "SHOPIFY_SHOP_URL",
    "SHOPIFY_API_KEY",
    "SHOPIFY_API_SECRET",
    "SHOPIFY_ACCESS_TOKEN",
    "GRAPH_API_TOKEN",
    "WHATSAPP_PHONE_NUMBER_ID",
    "WHATSAPP_BUSINESS_ACCOUNT_ID",
    "WEBHOOK_VERIFY_TOKEN",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "REDIS_PASSWORD",
];

fn dashboard(dir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shop-crm-dashboard"));
    for key in SETTING_KEYS {
        command.env_remove(key);
    }
    command
        .env("REDIS_URL", "redis://127.0.0.1:1")
        .arg("--env-file")
        .arg(dir.join(".env"))
        .arg("--data-dir")
        .arg(dir.join("data"))
        .args(args)
        .output()
        .expect("run dashboard binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn overview_falls_back_to_memory_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dashboard(dir.path(), &["overview"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("R$ 2.929,83"));
    assert!(out.contains("60.0%"));
    assert!(out.contains("[warning] Could not connect to Redis"));
    assert!(out.contains("CRM interactions:  5"));
    assert!(dir.path().join("data").join("logs").exists());
}

#[test]
fn conversations_list_seeded_interactions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dashboard(dir.path(), &["conversations", "--status", "Pending"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("0.0%"));
    assert!(out.contains("i1005"));
    assert!(!out.contains("w1001"));
}

#[test]
fn settings_save_is_idempotent_and_masks_secrets() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(".env"), "# local notes\nCUSTOM_FLAG=1\n").expect("seed env");
    let args = [
        "settings",
        "save",
        "whatsapp",
        "GRAPH_API_TOKEN=graph-secret",
        "WHATSAPP_PHONE_NUMBER_ID=5511999",
    ];

    let first = dashboard(dir.path(), &args);
    assert!(first.status.success());
    let after_first = fs::read(dir.path().join(".env")).expect("env after first save");
    let second = dashboard(dir.path(), &args);
    assert!(second.status.success());
    let after_second = fs::read(dir.path().join(".env")).expect("env after second save");
    assert_eq!(after_first, after_second);

    let content = String::from_utf8(after_second).expect("utf8");
    assert!(content.starts_with("# local notes\nCUSTOM_FLAG=1\n"));
    assert!(content.contains("GRAPH_API_TOKEN=graph-secret\n"));

    let shown = stdout(&dashboard(dir.path(), &["settings", "show"]));
    assert!(!shown.contains("graph-secret"));
    assert!(shown.contains("WhatsApp (Configured)"));
    assert!(shown.contains("Redis (Fallback (in-memory))"));
}

#[test]
fn settings_save_rejects_foreign_keys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dashboard(dir.path(), &["settings", "save", "redis", "OPENAI_MODEL=gpt-4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("CONFIG_INVALID"));
    assert!(!dir.path().join(".env").exists());
}

#[test]
fn crew_run_then_replay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let run = dashboard(
        dir.path(),
        &[
            "crew",
            "run",
            "--input",
            "SHOPIFY_SHOP_URL=demo.myshopify.com",
            "--input",
            "SHOPIFY_API_KEY=key",
        ],
    );
    assert!(run.status.success());
    assert!(stdout(&run).contains("log_interaction_task"));
    assert!(dir.path().join("data").join("crew").join("last_run.json").exists());

    let replay = dashboard(dir.path(), &["crew", "replay", "generate_response_task"]);
    assert!(replay.status.success());
    assert!(stdout(&replay).contains("from generate_response_task"));

    let missing = dashboard(dir.path(), &["crew", "replay", "no_such_task"]);
    assert!(!missing.status.success());
}

#[test]
fn crew_run_without_inputs_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dashboard(dir.path(), &["crew", "run"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PIPELINE_INVALID"));
}
