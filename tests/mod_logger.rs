use nexus_map::logger;
use nexus_map::utils::devlog;

#[test]
fn rolling_logger_writes_app_and_dev6_files() {
    let dir = tempfile::tempdir().unwrap();
    logger::init_rolling(Some(dir.path()), Some("debug"), Some(2), true).unwrap();

    log::info!("mapper log line");
    let _sink = devlog::enable_thread_sink();
    nexus_map::dev6!("dev6 line {}", 42);
    log::logger().flush();

    assert!(devlog::captured("dev6 line 42"));
    let app = std::fs::read_to_string(dir.path().join("mapper.log")).unwrap();
    assert!(app.contains("mapper log line"));
    assert!(!app.contains("dev6 line"));
    let dev = std::fs::read_to_string(dir.path().join("dev6.log")).unwrap();
    assert!(dev.contains("dev6 line 42"));

    assert!(logger::init_console(None).is_err());
}
