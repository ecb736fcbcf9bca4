//! Dispatcher startup resolution tests

use std::{collections::BTreeMap, path::PathBuf};

use common::{GlobalSettings, InitParam, InvalidSettings};
use eavesdrop_config::{ChannelEntry, ChannelError, Config, ConfigFile, ServiceObjectEntry};

use crate::{
    Bindings, DispatchState, Dispatcher, HandlerModule, NoSuchEventHandler, ServiceModule,
    StartupError, require_param,
};

fn channel_entry(operation: &str, handler_function: Option<&str>) -> ChannelEntry {
    ChannelEntry {
        table_name: "orders".to_string(),
        operation: operation.to_string(),
        primary_key_field: "id".to_string(),
        primary_key_type: "bigint".to_string(),
        schema: None,
        procedure_name: None,
        trigger_name: None,
        handler_function: handler_function.map(str::to_string),
        payload_fields: vec!["status".to_string()],
    }
}

fn connector(name: &str, host: Option<&str>) -> ServiceObjectEntry {
    ServiceObjectEntry {
        name: name.to_string(),
        class: "Connector".to_string(),
        init_params: host
            .map(|host| vec![InitParam::new("host", host)])
            .unwrap_or_default(),
    }
}

fn config(globals: GlobalSettings, service_objects: Vec<ServiceObjectEntry>) -> Config {
    let channels = BTreeMap::from([
        (
            "orders_created".to_string(),
            channel_entry("INSERT", Some("on_order")),
        ),
        ("orders_default".to_string(), channel_entry("UPDATE", None)),
        (
            "orders_unbound".to_string(),
            channel_entry("INSERT", Some("missing_fn")),
        ),
        ("orders_deleted".to_string(), channel_entry("DELETE", None)),
    ]);
    let file = ConfigFile {
        globals,
        service_objects,
        channels,
    };
    Config::from_file(file, PathBuf::from("eavesdrop.toml"))
}

fn shop_globals() -> GlobalSettings {
    GlobalSettings {
        handler_module: "shop_handlers".to_string(),
        service_module: "shop_services".to_string(),
        ..GlobalSettings::new("shop")
    }
}

struct Connector {
    host: String,
}

fn bindings() -> Bindings {
    Bindings::new()
        .with_handler_module(
            HandlerModule::new("shop_handlers").with_handler("on_order", |_, _| Ok(())),
        )
        .with_service_module(ServiceModule::new("shop_services").with_class(
            "Connector",
            |spec| {
                Ok(Connector {
                    host: require_param(spec, "host")?.to_string(),
                })
            },
        ))
}

#[test]
fn start_resolves_channel_handler_and_services() {
    //* Given
    let config = config(shop_globals(), vec![connector("db", Some("x"))]);

    //* When
    let dispatcher =
        Dispatcher::start(&config, "orders_created", &bindings()).expect("startup should succeed");

    //* Then
    assert_eq!(dispatcher.channel().name(), "orders_created");
    assert_eq!(dispatcher.handler().name(), "on_order");
    let db = dispatcher
        .services()
        .get_as::<Connector>("db")
        .expect("service object should be registered");
    assert_eq!(db.host, "x");
    assert_eq!(dispatcher.state(), DispatchState::Disconnected);
}

#[test]
fn channel_without_handler_uses_the_default_handler() {
    let config = config(shop_globals(), vec![]);

    let dispatcher =
        Dispatcher::start(&config, "orders_default", &bindings()).expect("startup should succeed");

    assert_eq!(dispatcher.handler().name(), "default_handler");
}

#[test]
fn empty_database_name_fails_first() {
    //* Given
    let globals = GlobalSettings {
        database_name: String::new(),
        ..shop_globals()
    };
    let config = config(globals, vec![connector("db", None)]);

    //* When
    let result = Dispatcher::start(&config, "no_such_channel", &bindings());

    //* Then
    assert!(matches!(
        result,
        Err(StartupError::InvalidSettings(InvalidSettings::EmptyDatabaseName))
    ));
}

#[test]
fn unknown_channel_fails_startup() {
    let config = config(shop_globals(), vec![]);

    let result = Dispatcher::start(&config, "no_such_channel", &bindings());

    assert!(matches!(
        result,
        Err(StartupError::Channel(ChannelError::NoSuchEventChannel(ref name))) if name == "no_such_channel"
    ));
}

#[test]
fn unsupported_operation_fails_startup() {
    let config = config(shop_globals(), vec![]);

    let result = Dispatcher::start(&config, "orders_deleted", &bindings());

    assert!(matches!(
        result,
        Err(StartupError::Channel(ChannelError::UnsupportedOperation { .. }))
    ));
}

#[test]
fn unbound_handler_fails_before_service_construction() {
    //* Given
    // The connector declaration is missing its host, so building services would fail too
    let config = config(shop_globals(), vec![connector("db", None)]);

    //* When
    let result = Dispatcher::start(&config, "orders_unbound", &bindings());

    //* Then
    match result {
        Err(StartupError::NoSuchEventHandler(err)) => assert_eq!(
            err,
            NoSuchEventHandler {
                function: "missing_fn".to_string(),
                module: "shop_handlers".to_string(),
            }
        ),
        other => panic!("unexpected startup result: {other:?}"),
    }
}

#[test]
fn failing_service_object_fails_startup() {
    //* Given
    let config = config(
        shop_globals(),
        vec![connector("db", Some("x")), connector("replica", None)],
    );

    //* When
    let result = Dispatcher::start(&config, "orders_created", &bindings());

    //* Then
    match result {
        Err(StartupError::ServiceObjectConstruction(err)) => {
            assert_eq!(err.name(), "replica");
            assert_eq!(err.class_name(), "Connector");
        }
        other => panic!("unexpected startup result: {other:?}"),
    }
}
