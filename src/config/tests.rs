use super::*;

fn raw_with_origin() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.origin.url = Some("http://origin.test".to_string());
    raw
}

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:8080");
    assert_eq!(
        settings.server.max_body_bytes.get() as u64,
        DEFAULT_MAX_BODY_BYTES
    );
    assert!(settings.origin.url.is_none());
    assert!(settings.origin.timeout.is_none());
    assert_eq!(settings.origin.retry_attempts.get(), 1);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.backend, StorageBackend::Memory);
    assert_eq!(settings.cache.namespace_mode, NamespaceMode::PerUrl);
    assert_eq!(settings.cache.shared_namespace, "v1");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_origin();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        listen_port: Some(4321),
        log_level: Some("debug".to_string()),
        origin_url: Some("https://override.test/".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(
        settings.origin.require_url().expect("origin").as_str(),
        "https://override.test/"
    );
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn origin_must_be_http_or_https() {
    let mut raw = RawSettings::default();
    raw.origin.url = Some("ftp://origin.test".to_string());

    let err = Settings::from_raw(raw).expect_err("ftp rejected");
    assert!(matches!(err, LoadError::Invalid { key: "origin.url", .. }));
}

#[test]
fn origin_must_be_absolute() {
    let mut raw = RawSettings::default();
    raw.origin.url = Some("/relative".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn missing_origin_is_only_an_error_when_required() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let err = settings.origin.require_url().expect_err("no origin");
    assert!(matches!(err, LoadError::Invalid { key: "origin.url", .. }));
}

#[test]
fn zero_retry_attempts_is_rejected() {
    let mut raw = raw_with_origin();
    raw.origin.retry_attempts = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);

    let err = Settings::from_raw(raw).expect_err("port 0 rejected");
    assert!(matches!(err, LoadError::Invalid { key: "server.port", .. }));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn namespace_limit_requires_memory_backend() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("disk".to_string());
    raw.cache.max_namespaces = Some(16);

    let err = Settings::from_raw(raw).expect_err("limit with disk");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_namespaces",
            ..
        }
    ));
}

#[test]
fn cache_overrides_apply_to_store_commands() {
    let mut raw = RawSettings::default();
    raw.apply_cache_overrides(&CacheOverrides {
        cache_backend: Some("disk".to_string()),
        cache_dir: Some(PathBuf::from("/var/cache/cachefront")),
        cache_namespace: Some("shared".to_string()),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, StorageBackend::Disk);
    assert_eq!(
        settings.cache.directory,
        PathBuf::from("/var/cache/cachefront")
    );
    assert_eq!(settings.cache.namespace_mode, NamespaceMode::Shared);
}

#[test]
fn precache_paths_resolve_against_origin() {
    let mut raw = raw_with_origin();
    raw.cache.precache = Some(vec![
        "/index.json".to_string(),
        "  ".to_string(),
        "/posts/1.json".to_string(),
    ]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    let urls = settings.precache_urls().expect("resolved");

    assert_eq!(
        urls.iter().map(Url::as_str).collect::<Vec<_>>(),
        vec![
            "http://origin.test/index.json",
            "http://origin.test/posts/1.json"
        ]
    );
}

#[test]
fn precache_without_origin_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.precache = Some(vec!["/index.json".to_string()]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.precache_urls().is_err());
}

#[test]
fn store_commands_require_disk_backend() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let err = settings
        .require_persistent_cache()
        .expect_err("memory backend has nothing to inspect");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));

    let mut raw = RawSettings::default();
    raw.cache.backend = Some("disk".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.require_persistent_cache().is_ok());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["cachefront"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "cachefront",
        "serve",
        "--listen-host",
        "0.0.0.0",
        "--origin-url",
        "http://origin.test",
        "--cache-backend",
        "disk",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.listen_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.origin_url.as_deref(),
                Some("http://origin.test")
            );
            assert_eq!(serve.overrides.cache.cache_backend.as_deref(), Some("disk"));
            assert_eq!(serve.overrides.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_namespaces_arguments() {
    let args = CliArgs::parse_from([
        "cachefront",
        "namespaces",
        "--cache-backend",
        "disk",
        "--cache-dir",
        "/tmp/cachefront",
    ]);

    match args.command.expect("namespaces command") {
        Command::Namespaces(store) => {
            assert_eq!(store.cache.cache_backend.as_deref(), Some("disk"));
            assert_eq!(
                store.cache.cache_dir,
                Some(PathBuf::from("/tmp/cachefront"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
