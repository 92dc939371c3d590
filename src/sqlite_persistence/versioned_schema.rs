use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

/// SQL expression evaluating to the current time in unix epoch milliseconds.
pub const NOW_MILLIS: &str = "cast((julianday('now') - 2440587.5) * 86400000 as integer)";

/// Column default that stamps a row with its insertion time.
pub const DEFAULT_TIMESTAMP_MILLIS: &str =
    "(cast((julianday('now') - 2440587.5) * 86400000 as integer))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn parse(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

/// A named index. Unique indices double as the table's uniqueness constraints,
/// so a constraint added by a later migration looks the same as one created
/// together with the table.
pub struct Index {
    pub name: &'static str,
    pub columns: &'static str,
    pub unique: bool,
}

impl Index {
    pub fn create(&self, conn: &Connection, table: &str) -> Result<()> {
        conn.execute(
            &format!(
                "CREATE {}INDEX {} ON {}({});",
                if self.unique { "UNIQUE " } else { "" },
                self.name,
                table,
                self.columns
            ),
            params![],
        )?;
        Ok(())
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [Index],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!(
                "\"{}\" {}",
                column.name,
                column.sql_type.as_sql()
            ));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for index in self.indices {
            index.create(conn, self.name)?;
        }
        Ok(())
    }

    pub fn drop(&self, conn: &Connection) -> Result<()> {
        conn.execute(&format!("DROP TABLE IF EXISTS {};", self.name), params![])?;
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let name = row.get::<usize, String>(1)?;
                let sql_type = SqlType::parse(&row.get::<_, String>(2)?).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(2, name.clone(), Type::Text)
                })?;
                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // Default values might be wrapped in parentheses, so we strip them before comparing
            if actual
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }

        for index in self.indices {
            let is_unique: Option<bool> = conn
                .query_row(
                    "SELECT il.\"unique\" FROM pragma_index_list(?1) AS il WHERE il.name = ?2",
                    params![self.name, index.name],
                    |row| row.get::<_, i32>(0).map(|u| u == 1),
                )
                .optional()?;
            match is_unique {
                None => bail!("Table {} is missing index '{}'", self.name, index.name),
                Some(actual) if actual != index.unique => bail!(
                    "Table {} index '{}' uniqueness mismatch: expected {}, got {}",
                    self.name,
                    index.name,
                    index.unique,
                    actual
                ),
                Some(_) => {}
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Upgrades a database at the previous version to this one.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        set_db_version(conn, self.version)
    }

    /// Drops every table of this schema and clears the recorded version.
    pub fn revert(&self, conn: &Connection) -> Result<()> {
        for table in self.tables.iter().rev() {
            table.drop(conn)?;
        }
        conn.execute("PRAGMA user_version = 0", [])?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

pub const BASE_DB_VERSION: usize = 99999;

/// Reads the schema version recorded in the database, `None` for a database
/// that was never initialized by us.
pub fn read_db_version(conn: &Connection) -> Result<Option<usize>> {
    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if raw_version == 0 {
        return Ok(None);
    }
    let version = raw_version - BASE_DB_VERSION as i64;
    if version < 1 {
        bail!(
            "Database version {} is invalid, does not contain base db version {}",
            raw_version,
            BASE_DB_VERSION
        );
    }
    Ok(Some(version as usize))
}

pub fn set_db_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + version),
        [],
    )?;
    Ok(())
}
