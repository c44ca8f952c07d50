use metering_ingest::config::{Config, QuerySpec};

fn load(config: &str) -> Result<Config, Vec<String>> {
    let config = Config::load_from_str(config)?;
    config.validate()?;
    Ok(config)
}

#[test]
fn happy_path() {
    let config = load(
        r#"
        queries = ["metering:pod_usage_cpu_cores", "metering:node_capacity_cpu_cores"]

        [source]
        endpoint = "http://localhost:9090"

        [sink]
        host = "127.0.0.1"
        database = "metering"
      "#,
    )
    .unwrap();

    assert_eq!(
        config.query_specs(),
        vec![
            QuerySpec::new("metering:pod_usage_cpu_cores"),
            QuerySpec::new("metering:node_capacity_cpu_cores"),
        ]
    );

    load(
        r#"
        queries = ["up"]
        source = {endpoint = "https://thanos:9091", auth = {strategy = "basic", user = "u", password = "p"}}
        sink = {port = 5433, ssl_mode = "require"}
        range = {lookback_secs = 3600, step_secs = 300}
      "#,
    )
    .unwrap();
}

#[test]
fn defaults_when_empty() {
    let config = load("").unwrap();
    assert_eq!(config.queries.len(), 15);
    assert!(config.queries.iter().all(|query| query.starts_with("metering:")));
}

#[test]
fn bad_endpoint() {
    let errors = load(
        r#"
        [source]
        endpoint = "ftp://prometheus"
      "#,
    )
    .unwrap_err();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("source.endpoint"), "{errors:?}");
}

#[test]
fn bad_batch_size_and_step() {
    let errors = load(
        r#"
        [sink]
        max_batch_size = 0

        [range]
        step_secs = 0
      "#,
    )
    .unwrap_err();

    assert_eq!(errors.len(), 2, "{errors:?}");
}

#[test]
fn colliding_tables() {
    let errors = load(r#"queries = ["a:b", "a_b"]"#).unwrap_err();
    assert_eq!(
        errors,
        vec!["Queries \"a:b\" and \"a_b\" map to the same table \"a_b\".".to_owned()]
    );
}

#[test]
fn overlong_table_name() {
    let query = format!("metering:{}", "y".repeat(60));
    let errors = load(&format!("queries = [\"{query}\"]")).unwrap_err();

    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("longer than 63 bytes"), "{errors:?}");
}

#[test]
fn unknown_field() {
    let errors = load(
        r#"
        [sink]
        hostname = "db"
      "#,
    )
    .unwrap_err();

    assert!(errors[0].contains("hostname"), "{errors:?}");
}
