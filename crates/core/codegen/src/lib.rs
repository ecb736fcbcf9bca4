//! SQL generation for change-notification channels
//!
//! Turns a [`ChannelSpec`] into the Postgres artifacts that publish row changes on the
//! channel: a `plpgsql` trigger function that builds a JSON payload from the affected row and
//! sends it with `pg_notify`, and an `AFTER ... FOR EACH ROW` trigger that binds the function
//! to the table.
//!
//! Rendering is pure text generation. Given the same spec the output is byte-identical, so
//! generated scripts can be regenerated and diffed safely.

use common::ChannelSpec;

pub mod ident;

use self::ident::{IdentKind, is_plain_identifier, is_plain_type};

/// The SQL artifacts generated for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSql {
    /// The `json_build_object(...)` expression over the affected row
    pub json_builder: String,
    /// The trigger function definition
    pub procedure: String,
    /// The trigger definition
    pub trigger: String,
}

impl ChannelSql {
    /// The procedure followed by the trigger, ready to be applied as a single script
    pub fn script(&self) -> String {
        format!("{}\n{}", self.procedure, self.trigger)
    }
}

/// Renders the SQL artifacts for a channel.
///
/// Defaults for the schema, procedure and trigger names are resolved here, at generation time.
#[tracing::instrument(skip_all, fields(channel = %spec.name()), err)]
pub fn render(spec: &ChannelSpec) -> Result<ChannelSql, RenderError> {
    let schema = spec.schema();
    let procedure_name = spec.procedure_name();
    let trigger_name = spec.trigger_name();

    check_identifier(IdentKind::Channel, spec.name())?;
    check_identifier(IdentKind::Schema, schema)?;
    check_identifier(IdentKind::Table, spec.table_name())?;
    check_identifier(IdentKind::Procedure, &procedure_name)?;
    check_identifier(IdentKind::Trigger, &trigger_name)?;
    check_identifier(IdentKind::Column, spec.primary_key_field())?;
    if !is_plain_type(spec.primary_key_type()) {
        return Err(RenderError::InvalidType(spec.primary_key_type().to_string()));
    }

    let json_builder = render_json_builder(spec)?;

    let procedure = indoc::formatdoc! {r#"
        CREATE OR REPLACE FUNCTION {schema}.{procedure_name}() RETURNS trigger AS $$
        DECLARE
            row_key {pk_type};
            payload json;
        BEGIN
            row_key := NEW.{pk_field};
            payload := {json_builder};
            RAISE DEBUG '% on {schema}.{table_name}, notifying {channel} for key %', TG_OP, row_key;
            PERFORM pg_notify('{channel}', payload::text);
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        "#,
        schema = schema,
        procedure_name = procedure_name,
        pk_type = spec.primary_key_type().trim(),
        pk_field = spec.primary_key_field(),
        json_builder = json_builder,
        table_name = spec.table_name(),
        channel = spec.name(),
    };

    let trigger = indoc::formatdoc! {r#"
        DROP TRIGGER IF EXISTS {trigger_name} ON {schema}.{table_name};
        CREATE TRIGGER {trigger_name}
            AFTER {operation} ON {schema}.{table_name}
            FOR EACH ROW EXECUTE PROCEDURE {schema}.{procedure_name}();
        "#,
        trigger_name = trigger_name,
        schema = schema,
        table_name = spec.table_name(),
        operation = spec.operation(),
        procedure_name = procedure_name,
    };

    Ok(ChannelSql {
        json_builder,
        procedure,
        trigger,
    })
}

/// Renders the `json_build_object` expression mapping every notification field to the
/// matching column of `NEW`, in lexicographic field order.
pub fn render_json_builder(spec: &ChannelSpec) -> Result<String, RenderError> {
    let mut args = Vec::new();
    for field in spec.notification_fields() {
        check_identifier(IdentKind::Column, field)?;
        args.push(format!("'{field}', NEW.{field}"));
    }
    Ok(format!("json_build_object({})", args.join(", ")))
}

fn check_identifier(kind: IdentKind, value: &str) -> Result<(), RenderError> {
    if is_plain_identifier(value) {
        Ok(())
    } else {
        Err(RenderError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

/// Errors that can occur while rendering a channel's SQL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A name interpolated into the SQL is not a plain identifier
    ///
    /// Only `[A-Za-z_][A-Za-z0-9_]*` names of at most 63 bytes are emitted unquoted.
    #[error("invalid {kind} \"{value}\": expected a plain SQL identifier of at most 63 bytes")]
    InvalidIdentifier { kind: IdentKind, value: String },

    /// The primary key type is not a plain SQL type expression
    #[error("invalid primary key type \"{0}\"")]
    InvalidType(String),
}
