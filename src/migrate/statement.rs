use sqlx::SqliteConnection;
use tracing::debug;

/// Default `SQLITE_MAX_VARIABLE_NUMBER` for SQLite 3.32 and later.
const MAX_BIND_PARAMS: usize = 32_766;

/// Multi-row `INSERT ... VALUES (..), (..)` for one destination table.
///
/// An insert with no rows executes nothing and reports zero affected rows.
#[derive(Debug)]
pub(crate) struct BulkInsert {
    table: &'static str,
    columns: &'static [&'static str],
    values: Vec<String>,
}

impl BulkInsert {
    pub(crate) fn new(table: &'static str, columns: &'static [&'static str]) -> Self {
        debug_assert!(!columns.is_empty(), "bulk insert needs at least one column");
        Self {
            table,
            columns,
            values: Vec::new(),
        }
    }

    pub(crate) fn push_row<I>(&mut self, row: I)
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.values.len();
        self.values.extend(row);
        debug_assert_eq!(
            self.values.len() - before,
            self.columns.len(),
            "row width must match column count for {}",
            self.table
        );
    }

    pub(crate) fn row_count(&self) -> usize {
        self.values.len() / self.columns.len()
    }

    fn rows_per_statement(&self) -> usize {
        (MAX_BIND_PARAMS / self.columns.len()).max(1)
    }

    fn sql_for(&self, rows: usize) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(self.table),
            columns,
            vec![tuple.as_str(); rows].join(", ")
        )
    }

    /// Statements that will be executed, in order. Empty when there are no rows.
    pub(crate) fn statements(&self) -> Vec<(String, &[String])> {
        let width = self.columns.len();
        self.values
            .chunks(self.rows_per_statement() * width)
            .map(|chunk| (self.sql_for(chunk.len() / width), chunk))
            .collect()
    }

    pub(crate) async fn execute(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let statements = self.statements();
        debug!(
            target: "notifications_migrator",
            event = "bulk_insert",
            table = self.table,
            rows = self.row_count(),
            statements = statements.len()
        );
        let mut affected = 0;
        for (sql, values) in statements {
            let mut query = sqlx::query(&sql);
            for value in values {
                query = query.bind(value.as_str());
            }
            affected += query.execute(&mut *conn).await?.rows_affected();
        }
        Ok(affected)
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}
