// tests/config_load.rs
use channel_sync::config::{AppConfig, DEFAULT_SOURCES, ENV_CONFIG_PATH};
use std::{env, fs};

const ENV_KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    "CHANNELS_CSV",
    "RSS_BASE",
    "INITIAL_LIMIT",
    "RECENT_WINDOW",
    "STATE_DIR",
    "TELEGRAM_BOT_TOKEN",
    "NOTIFY_CHAT_IDS",
    "ADMIN_ALLOW_IDS",
    "METRICS_LISTEN",
];

fn clear_env() {
    for k in ENV_KEYS {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // keep the repo's own config/ out of the picture
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) nothing at all → defaults
    let cfg = AppConfig::load(None).unwrap();
    assert_eq!(cfg.sources, DEFAULT_SOURCES.to_vec());
    assert_eq!(cfg.sync.bootstrap_limit, 20);

    // 2) ./config/channel_sync.toml
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/channel_sync.toml"),
        r#"
sources = ["@MELOCHOV", " ABKS07 ", "ABKS07"]
state_dir = "data"
[sync]
recent_window = 50
"#,
    )
    .unwrap();
    let cfg = AppConfig::load(None).unwrap();
    assert_eq!(cfg.sources, vec!["@MELOCHOV".to_string(), "ABKS07".to_string()]);
    assert_eq!(cfg.sync.recent_window, 50);
    assert_eq!(cfg.state_dir, std::path::PathBuf::from("data"));
    let names: Vec<_> = cfg.static_sources().iter().map(|s| s.to_string()).collect();
    assert_eq!(names, vec!["MELOCHOV", "ABKS07"]);

    // 3) $CHANNEL_SYNC_CONFIG wins over the default path
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, r#"sources = ["jjsbossj"]"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, &p_env);
    let cfg = AppConfig::load(None).unwrap();
    assert_eq!(cfg.sources, vec!["jjsbossj".to_string()]);

    // 4) ...and CHANNELS_CSV wins over the file
    env::set_var("CHANNELS_CSV", "toolsSADA,MELOCHOV");
    env::set_var("NOTIFY_CHAT_IDS", "-1001, -1001, @ops");
    let cfg = AppConfig::load(None).unwrap();
    assert_eq!(cfg.sources, vec!["toolsSADA".to_string(), "MELOCHOV".to_string()]);
    assert_eq!(cfg.telegram.notify_chat_ids, vec!["-1001".to_string(), "@ops".to_string()]);

    // 5) a dangling $CHANNEL_SYNC_CONFIG is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(AppConfig::load(None).is_err());

    clear_env();
    env::set_current_dir(old).unwrap();
}

#[serial_test::serial]
#[test]
fn explicit_path_must_parse() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("bad.toml");
    fs::write(&p, "sources = [").unwrap();
    assert!(AppConfig::load(Some(p.as_path())).is_err());
    assert!(AppConfig::load(Some(dir.path().join("nope.toml").as_path())).is_err());
}
