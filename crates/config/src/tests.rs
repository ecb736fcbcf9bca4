use std::{fs, path::PathBuf};

use common::{DbOperation, InitParam, UnsupportedOperation};
use tempfile::TempDir;

use crate::{ChannelError, ConfigFile, LoadError, load};

const TOML_CONFIG: &str = indoc::indoc! {r#"
    [globals]
    database_host = "db.internal"
    database_name = "shop"
    handler_module = "shop_handlers"
    debug = true

    [[service_objects]]
    name = "db"
    class = "Connector"
    init_params = [
        { name = "host", value = "x" },
        { name = "port", value = "5432" },
    ]

    [[service_objects]]
    name = "sink"
    class = "JsonlSink"

    [channels.orders_created]
    table_name = "orders"
    operation = "INSERT"
    primary_key_field = "id"
    primary_key_type = "bigint"
    handler_function = "on_order"
    payload_fields = ["status", "amount", "status"]

    [channels.orders_changed]
    table_name = "orders"
    operation = "update"
    primary_key_field = "id"
    primary_key_type = "bigint"
    schema = "sales"
    trigger_name = "orders_changed_trg"

    [channels.orders_deleted]
    table_name = "orders"
    operation = "DELETE"
    primary_key_field = "id"
    primary_key_type = "bigint"
"#};

fn write_config(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write config file");
    (dir, path)
}

#[test]
fn load_toml_config_resolves_globals_and_service_objects() {
    //* Given
    let (_dir, path) = write_config("eavesdrop.toml", TOML_CONFIG);

    //* When
    let config = load(&path).expect("config should load");

    //* Then
    assert_eq!(config.globals.database_host, "db.internal");
    assert_eq!(config.globals.database_name, "shop");
    assert_eq!(config.globals.handler_module, "shop_handlers");
    assert_eq!(config.globals.service_module, "eavesdrop_services");
    assert!(config.globals.debug);

    let names: Vec<_> = config.service_objects.iter().map(|s| s.name()).collect();
    assert_eq!(names, ["db", "sink"]);
    assert_eq!(config.service_objects[0].class_name(), "Connector");
    assert_eq!(
        config.service_objects[0].init_params(),
        [InitParam::new("host", "x"), InitParam::new("port", "5432")]
    );
    assert!(config.service_objects[1].init_params().is_empty());
}

#[test]
fn channel_resolves_into_a_validated_spec() {
    //* Given
    let (_dir, path) = write_config("eavesdrop.toml", TOML_CONFIG);
    let config = load(&path).expect("config should load");

    //* When
    let created = config.channel("orders_created").expect("channel is valid");
    let changed = config.channel("orders_changed").expect("channel is valid");

    //* Then
    assert_eq!(created.operation(), DbOperation::Insert);
    assert_eq!(created.handler_function(), Some("on_order"));
    assert_eq!(created.procedure_name(), "orders_insert_notify");
    let fields: Vec<_> = created.payload_fields().iter().map(String::as_str).collect();
    assert_eq!(fields, ["amount", "status"]);

    assert_eq!(changed.operation(), DbOperation::Update);
    assert_eq!(changed.schema(), "sales");
    assert_eq!(changed.trigger_name(), "orders_changed_trg");
    assert_eq!(changed.procedure_name(), "orders_update_notify");
    assert_eq!(changed.handler_function(), None);
}

#[test]
fn unsupported_operation_only_fails_its_channel() {
    //* Given
    let (_dir, path) = write_config("eavesdrop.toml", TOML_CONFIG);
    let config = load(&path).expect("config should load");

    //* When
    let result = config.channel("orders_deleted");

    //* Then
    assert!(matches!(
        result,
        Err(ChannelError::UnsupportedOperation { ref channel, ref source })
            if channel == "orders_deleted" && *source == UnsupportedOperation("DELETE".to_string())
    ));
    assert!(config.channel("orders_created").is_ok());
}

#[test]
fn unknown_channel_is_reported() {
    let (_dir, path) = write_config("eavesdrop.toml", TOML_CONFIG);
    let config = load(&path).expect("config should load");

    let result = config.channel("payments_created");

    assert!(matches!(
        result,
        Err(ChannelError::NoSuchEventChannel(name)) if name == "payments_created"
    ));
    let names: Vec<_> = config.channel_names().collect();
    assert_eq!(names, ["orders_changed", "orders_created", "orders_deleted"]);
}

#[test]
fn load_yaml_config_with_legacy_channel_keys() {
    //* Given
    let yaml = indoc::indoc! {r#"
        globals:
          database_name: shop
          project_directory: /srv/shop
        service_objects:
          - name: db
            class: Connector
            init_params:
              - name: host
                value: x
        channels:
          users_created:
            handler_function: default_handler
            db_table_name: users
            db_operation: INSERT
            pk_field_name: user_id
            pk_field_type: integer
            db_schema: ""
            db_proc_name: users_notify
            payload_fields:
              - email
    "#};
    let (_dir, path) = write_config("eavesdrop.yaml", yaml);

    //* When
    let config = load(&path).expect("config should load");
    let channel = config.channel("users_created").expect("channel is valid");

    //* Then
    assert_eq!(config.globals.database_host, "127.0.0.1");
    assert_eq!(config.globals.project_directory, "/srv/shop");
    assert_eq!(config.service_objects[0].param("host"), Some("x"));
    assert_eq!(channel.table_name(), "users");
    assert_eq!(channel.primary_key_field(), "user_id");
    assert_eq!(channel.primary_key_type(), "integer");
    assert_eq!(channel.schema(), "public");
    assert_eq!(channel.procedure_name(), "users_notify");
    assert_eq!(channel.trigger_name(), "trg_users_insert");
    assert_eq!(channel.handler_function(), Some("default_handler"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("absent.toml");

    let result = load(&path);

    assert!(matches!(result, Err(LoadError::ConfigNotAFile(p)) if p == path));
}

#[test]
fn malformed_channel_entry_fails_loading() {
    //* Given
    let (_dir, path) = write_config(
        "eavesdrop.toml",
        indoc::indoc! {r#"
            [channels.orders_created]
            table_name = "orders"
        "#},
    );

    //* When
    let result = load(&path);

    //* Then
    assert!(matches!(result, Err(LoadError::ConfigFile(_))));
}

#[test]
fn starter_config_is_loadable() {
    //* Given
    let contents = ConfigFile::starter("shop")
        .to_toml()
        .expect("starter config should serialize");
    let (_dir, path) = write_config("eavesdrop.toml", &contents);

    //* When
    let config = load(&path).expect("starter config should load");

    //* Then
    assert_eq!(config.globals.database_name, "shop");
    assert_eq!(config.service_objects[0].class_name(), "JsonlSink");
    assert_eq!(config.service_objects[0].param("path"), Some("events.jsonl"));
    let channel = config.channel("orders_created").expect("channel is valid");
    assert_eq!(channel.operation(), DbOperation::Insert);
    assert_eq!(channel.handler_function(), Some("default_handler"));
}
