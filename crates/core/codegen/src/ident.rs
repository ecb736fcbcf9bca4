//! Validation of the names interpolated into generated SQL

/// Maximum identifier length accepted by Postgres (`NAMEDATALEN - 1`). Longer names are
/// silently truncated by the server, so they are rejected here instead.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// The role an identifier plays in the generated SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    Channel,
    Schema,
    Table,
    Procedure,
    Trigger,
    Column,
}

impl IdentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel name",
            Self::Schema => "schema",
            Self::Table => "table name",
            Self::Procedure => "procedure name",
            Self::Trigger => "trigger name",
            Self::Column => "column name",
        }
    }
}

impl std::fmt::Display for IdentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Returns `true` if `name` is a plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most
/// [`MAX_IDENTIFIER_LEN`] bytes.
///
/// `$` is not accepted even though Postgres allows it after the first character: generated
/// function bodies are `$$` quoted.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns `true` if `ty` looks like a plain SQL type expression such as `bigint`,
/// `character varying(32)`, `numeric(10, 2)`, `uuid[]` or `pg_catalog.int8`.
///
/// Quotes, semicolons and comment markers are never accepted.
pub fn is_plain_type(ty: &str) -> bool {
    let ty = ty.trim();
    let Some(first) = ty.chars().next() else {
        return false;
    };

    let mut depth = 0i32;
    for c in ty.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | ',' | '.') => {}
            _ => return false,
        }
        if depth < 0 {
            return false;
        }
    }

    first.is_ascii_alphabetic() && depth == 0
}
