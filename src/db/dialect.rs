//! SQL dialect tags and neutral-SQL rewriting.
//!
//! Callers write statements in a backend-neutral convention: backticks for
//! identifier quoting and `?` for placeholders. Adapters rewrite that to
//! their native dialect before execution; for sqlite and mysql the neutral
//! convention is already native, postgres needs both converted.

/// Backend dialect tag carried by every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Canonical driver name for this dialect.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
        }
    }

    /// Rewrite neutral SQL into this dialect.
    pub fn rewrite(&self, sql: &str) -> String {
        match self {
            Self::Sqlite | Self::MySql => sql.to_string(),
            Self::Postgres => rewrite_postgres(sql),
        }
    }

    /// Quote an identifier for direct interpolation into native SQL.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::Sqlite | Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Backticks become double quotes and `?` placeholders become `$1..$n`.
/// Characters inside single-quoted literals pass through untouched.
fn rewrite_postgres(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut placeholder = 0usize;
    let mut in_literal = false;
    for ch in sql.chars() {
        if in_literal {
            if ch == '\'' {
                in_literal = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '\'' => {
                in_literal = true;
                out.push(ch);
            }
            '`' => out.push('"'),
            '?' => {
                placeholder += 1;
                out.push('$');
                out.push_str(&placeholder.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}
