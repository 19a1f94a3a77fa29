//! Identifier validation and quoting.
//!
//! MySQL cannot bind placeholders in identifier positions (`USE ?` or
//! `DESCRIBE ?` are syntax errors), so database and table names have to be
//! spliced into statement text. This module is the only place that happens:
//! [`SafeIdentifier::validate`] decides whether a name may be spliced and
//! [`SafeIdentifier::quoted`] produces the backtick-quoted form.
//!
//! Value positions (WHERE clauses, literals) never go through here.

use crate::error::{DbError, DbResult};
use std::fmt;

/// The MySQL identifier quote character.
pub const QUOTE: char = '`';

/// An identifier that has passed validation and may be spliced between
/// backticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeIdentifier {
    field: &'static str,
    name: String,
}

impl SafeIdentifier {
    /// Validate a raw caller-supplied name.
    ///
    /// `field` names the argument ("database", "table") and is used in the
    /// error message. Length limits are left to the server.
    pub fn validate(field: &'static str, name: &str) -> DbResult<Self> {
        if name.is_empty() {
            return Err(DbError::invalid_input(format!("{} is required", field)));
        }
        if name.contains(QUOTE) {
            return Err(DbError::invalid_identifier(field));
        }
        Ok(Self {
            field,
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The identifier wrapped in backticks, ready to splice into a statement.
    pub fn quoted(&self) -> String {
        format!("{QUOTE}{}{QUOTE}", self.name)
    }
}

impl fmt::Display for SafeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Statements that need a spliced identifier. Each statement kind has
/// exactly one constructor here.
pub mod statements {
    use super::SafeIdentifier;

    pub const SHOW_DATABASES: &str = "SHOW DATABASES";
    pub const SHOW_TABLES: &str = "SHOW TABLES";

    pub fn use_database(database: &SafeIdentifier) -> String {
        format!("USE {}", database.quoted())
    }

    pub fn describe_table(table: &SafeIdentifier) -> String {
        format!("DESCRIBE {}", table.quoted())
    }
}
