//! Channel specification: one notification channel bound to one table and operation.

use std::{borrow::Cow, collections::BTreeSet};

/// Schema used when a channel does not name one explicitly.
pub const DEFAULT_SCHEMA: &str = "public";

/// Row-level database operations a channel can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum DbOperation {
    /// Fires on `INSERT`
    Insert,
    /// Fires on `UPDATE`
    Update,
}

impl DbOperation {
    /// Returns the SQL keyword for the operation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }

    /// Returns the lower-case form used when deriving procedure and trigger names
    #[must_use]
    pub fn as_lower_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for DbOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbOperation {
    type Err = UnsupportedOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("INSERT") => Ok(Self::Insert),
            s if s.eq_ignore_ascii_case("UPDATE") => Ok(Self::Update),
            _ => Err(UnsupportedOperation(s.to_string())),
        }
    }
}

impl serde::Serialize for DbOperation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for DbOperation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: Cow<'de, str> = serde::Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The database operation named by a channel is not one of the supported operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The database operation \"{0}\" is not supported")]
pub struct UnsupportedOperation(pub String);

/// Describes one notification channel bound to one table.
///
/// Optional names (`schema`, `procedure_name`, `trigger_name`) are kept as supplied. Their
/// defaults are derived on access, so regenerating SQL from the same spec always yields the
/// same names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    name: String,
    table_name: String,
    schema: Option<String>,
    operation: DbOperation,
    primary_key_field: String,
    primary_key_type: String,
    procedure_name: Option<String>,
    trigger_name: Option<String>,
    handler_function: Option<String>,
    payload_fields: BTreeSet<String>,
}

impl ChannelSpec {
    /// Creates a channel spec with no payload fields beyond the primary key.
    ///
    /// Fails if `operation` is not a supported database operation.
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        operation: &str,
        primary_key_field: impl Into<String>,
        primary_key_type: impl Into<String>,
    ) -> Result<Self, UnsupportedOperation> {
        Ok(Self {
            name: name.into(),
            table_name: table_name.into(),
            schema: None,
            operation: operation.parse()?,
            primary_key_field: primary_key_field.into(),
            primary_key_type: primary_key_type.into(),
            procedure_name: None,
            trigger_name: None,
            handler_function: None,
            payload_fields: BTreeSet::new(),
        })
    }

    /// The channel name, used verbatim as the `LISTEN`/`NOTIFY` channel
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The schema the table lives in, [`DEFAULT_SCHEMA`] when not set
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn operation(&self) -> DbOperation {
        self.operation
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    pub fn primary_key_type(&self) -> &str {
        &self.primary_key_type
    }

    /// The stored procedure name, `<table>_<operation>_notify` when not set
    pub fn procedure_name(&self) -> Cow<'_, str> {
        match &self.procedure_name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!(
                "{}_{}_notify",
                self.table_name,
                self.operation.as_lower_str()
            )),
        }
    }

    /// The trigger name, `trg_<table>_<operation>` when not set
    pub fn trigger_name(&self) -> Cow<'_, str> {
        match &self.trigger_name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!(
                "trg_{}_{}",
                self.table_name,
                self.operation.as_lower_str()
            )),
        }
    }

    /// The configured handler function, `None` selects the default handler
    pub fn handler_function(&self) -> Option<&str> {
        self.handler_function.as_deref()
    }

    /// Configured payload columns in canonical (lexicographic) order
    pub fn payload_fields(&self) -> &BTreeSet<String> {
        &self.payload_fields
    }

    /// Columns carried by the notification payload: the payload fields plus the primary key,
    /// in canonical order and without duplicates.
    pub fn notification_fields(&self) -> BTreeSet<&str> {
        self.payload_fields
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.primary_key_field.as_str()))
            .collect()
    }

    #[must_use]
    pub fn with_schema(&self, schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_procedure_name(&self, procedure_name: impl Into<String>) -> Self {
        Self {
            procedure_name: Some(procedure_name.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_trigger_name(&self, trigger_name: impl Into<String>) -> Self {
        Self {
            trigger_name: Some(trigger_name.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_handler_function(&self, handler_function: impl Into<String>) -> Self {
        Self {
            handler_function: Some(handler_function.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_payload_field(&self, field: impl Into<String>) -> Self {
        let mut payload_fields = self.payload_fields.clone();
        payload_fields.insert(field.into());
        Self {
            payload_fields,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_payload_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut payload_fields = self.payload_fields.clone();
        payload_fields.extend(fields.into_iter().map(Into::into));
        Self {
            payload_fields,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn without_payload_field(&self, field: &str) -> Self {
        let mut payload_fields = self.payload_fields.clone();
        payload_fields.remove(field);
        Self {
            payload_fields,
            ..self.clone()
        }
    }
}
