//! Statement Executor for TableDB
//!
//! This module validates parsed statements against the stored schema, applies
//! them to the record store and turns every outcome, failures included, into
//! an `ExecutionResult`.

use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::catalog::{DataType, Schema, Value};
use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::sql::ast::*;
use crate::sql::Parser;
use crate::storage::{RecordStore, Row};

/// Outcome class of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultKind {
    Success,
    Error,
}

/// Statement result
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub kind: ResultKind,
    /// Human-readable summary or error message
    pub message: String,
    /// Number of rows inserted, updated or deleted
    pub affected_rows: usize,
    /// Column names of `rows` (SELECT only)
    pub columns: Vec<String>,
    /// Result rows (SELECT only)
    pub rows: Vec<Row>,
    /// Error class, set when `kind` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time spent parsing and executing the statement
    pub execution_time: Duration,
}

impl ExecutionResult {
    /// Create a successful result with a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Success,
            message: message.into(),
            affected_rows: 0,
            columns: Vec::new(),
            rows: Vec::new(),
            error_kind: None,
            execution_time: Duration::ZERO,
        }
    }

    /// Create a successful result with affected rows count
    pub fn with_affected_rows(count: usize, message: impl Into<String>) -> Self {
        Self {
            affected_rows: count,
            ..Self::with_message(message)
        }
    }

    /// Create a successful result carrying rows
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let message = format!("{} row(s) returned", rows.len());
        Self {
            columns,
            rows,
            ..Self::with_message(message)
        }
    }

    /// Create a failed result from an error
    pub fn from_error(err: &Error) -> Self {
        Self {
            kind: ResultKind::Error,
            error_kind: Some(err.kind()),
            ..Self::with_message(err.to_string())
        }
    }

    fn timed(mut self, started: Instant) -> Self {
        self.execution_time = started.elapsed();
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResultKind::Success
    }

    /// Rows as column-name to value maps, in column order
    pub fn records(&self) -> Vec<IndexMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| row.to_record(&self.columns))
            .collect()
    }
}

/// Execution Engine
///
/// Holds no table state between calls: every statement loads what it needs
/// from the record store and persists what it changed.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    store: RecordStore,
}

impl ExecutionEngine {
    /// Create an engine over an opened record store
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Open the record store described by `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(RecordStore::open(config.data_dir.clone())?))
    }

    /// The underlying record store, for metadata calls that bypass SQL
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Parse and execute one statement. Never fails: errors are reported in
    /// the returned result.
    pub fn execute(&self, database: &str, sql: &str) -> ExecutionResult {
        let started = Instant::now();
        let result = match Parser::new(sql).and_then(|mut p| p.parse()) {
            Ok(statement) => self.run(database, statement),
            Err(e) => reject(database, &e),
        };
        result.timed(started)
    }

    /// Parse and execute a `;`-separated batch. A batch that does not parse
    /// yields a single error result; otherwise every statement runs, in
    /// order, whether or not earlier ones failed.
    pub fn execute_batch(&self, database: &str, sql: &str) -> Vec<ExecutionResult> {
        let started = Instant::now();
        match Parser::new(sql).and_then(|mut p| p.parse_all()) {
            Ok(statements) => statements
                .into_iter()
                .map(|statement| {
                    let started = Instant::now();
                    self.run(database, statement).timed(started)
                })
                .collect(),
            Err(e) => vec![reject(database, &e).timed(started)],
        }
    }

    fn run(&self, database: &str, statement: Statement) -> ExecutionResult {
        match self.execute_statement(database, statement) {
            Ok(result) => result,
            Err(e) => reject(database, &e),
        }
    }

    /// Execute a parsed statement
    pub fn execute_statement(
        &self,
        database: &str,
        statement: Statement,
    ) -> Result<ExecutionResult> {
        debug!(
            database = %database,
            statement = statement.verb(),
            table = %statement.table(),
            "executing statement"
        );

        match statement {
            Statement::CreateTable(stmt) => self.execute_create_table(database, stmt),
            Statement::DropTable(stmt) => self.execute_drop_table(database, stmt),
            Statement::Select(stmt) => self.execute_select(database, stmt),
            Statement::Insert(stmt) => self.execute_insert(database, stmt),
            Statement::Update(stmt) => self.execute_update(database, stmt),
            Statement::Delete(stmt) => self.execute_delete(database, stmt),
        }
    }

    // ========== DDL ==========

    fn execute_create_table(
        &self,
        database: &str,
        stmt: CreateTableStatement,
    ) -> Result<ExecutionResult> {
        let schema = Schema::from_columns(stmt.columns);
        self.store.create_table(database, &stmt.table, schema)?;
        Ok(ExecutionResult::with_message(format!(
            "Table '{}' created",
            stmt.table
        )))
    }

    fn execute_drop_table(
        &self,
        database: &str,
        stmt: DropTableStatement,
    ) -> Result<ExecutionResult> {
        self.store.drop_table(database, &stmt.table)?;
        Ok(ExecutionResult::with_message(format!(
            "Table '{}' dropped",
            stmt.table
        )))
    }

    // ========== SELECT ==========

    fn execute_select(&self, database: &str, stmt: SelectStatement) -> Result<ExecutionResult> {
        let (schema, rows) = self.store.load_table(database, &stmt.table)?;

        let filter = stmt
            .where_clause
            .as_ref()
            .map(|p| bind_predicate(&schema, &stmt.table, p))
            .transpose()?;
        let matching = |rows: Vec<Row>| -> Vec<Row> {
            rows.into_iter()
                .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
                .collect()
        };

        if stmt.is_grouped() {
            let grouping = Grouping::bind(&schema, &stmt)?;
            let (columns, rows) = grouping.apply(matching(rows))?;
            return Ok(ExecutionResult::with_rows(columns, rows));
        }

        // Resolve every referenced column before touching rows
        let (columns, indices) = match &stmt.projection {
            Projection::Wildcard => (
                schema.column_names(),
                (0..schema.column_count()).collect::<Vec<_>>(),
            ),
            Projection::Columns(items) => {
                let mut names = Vec::with_capacity(items.len());
                let mut indices = Vec::with_capacity(items.len());
                for item in items {
                    let name = item.output_name();
                    indices.push(column_index(&schema, &stmt.table, &name)?);
                    names.push(name);
                }
                (names, indices)
            }
        };
        let order = stmt
            .order_by
            .as_ref()
            .map(|o| column_index(&schema, &stmt.table, &o.column).map(|i| (i, o.ascending)))
            .transpose()?;

        let mut rows = matching(rows);

        if let Some((index, ascending)) = order {
            sort_rows(&mut rows, index, ascending);
        }

        if let Some(limit) = stmt.limit {
            rows.truncate(limit);
        }

        let rows = match stmt.projection {
            Projection::Wildcard => rows,
            Projection::Columns(_) => rows.iter().map(|r| r.project(&indices)).collect(),
        };

        Ok(ExecutionResult::with_rows(columns, rows))
    }

    // ========== INSERT ==========

    fn execute_insert(&self, database: &str, stmt: InsertStatement) -> Result<ExecutionResult> {
        let (schema, mut rows) = self.store.load_table(database, &stmt.table)?;

        if stmt.values.len() != schema.column_count() {
            return Err(Error::ArityMismatch {
                table: stmt.table,
                expected: schema.column_count(),
                found: stmt.values.len(),
            });
        }

        let values = schema
            .columns()
            .iter()
            .zip(&stmt.values)
            .map(|(column, literal)| column.coerce(literal))
            .collect::<Result<Vec<_>>>()?;
        let row = Row::new(values);

        check_constraints(&stmt.table, &schema, &row, &rows, None)?;

        rows.push(row);
        self.store
            .persist_table(database, &stmt.table, &schema, &rows)?;

        Ok(ExecutionResult::with_affected_rows(1, "1 row inserted"))
    }

    // ========== UPDATE ==========

    fn execute_update(&self, database: &str, stmt: UpdateStatement) -> Result<ExecutionResult> {
        let (schema, mut rows) = self.store.load_table(database, &stmt.table)?;

        let filter = bind_predicate(&schema, &stmt.table, &stmt.where_clause)?;
        let assignments = stmt
            .assignments
            .iter()
            .map(|(name, literal)| {
                let index = column_index(&schema, &stmt.table, name)?;
                let value = schema.columns()[index].coerce(literal)?;
                Ok((index, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let matched: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.matches(row))
            .map(|(i, _)| i)
            .collect();

        if matched.is_empty() {
            return Ok(ExecutionResult::with_affected_rows(0, "0 row(s) updated"));
        }

        // Rows are updated in a working copy; any violation abandons it
        // before anything is persisted.
        for &i in &matched {
            let mut row = rows[i].clone();
            for (index, value) in &assignments {
                row.set(*index, value.clone());
            }
            check_constraints(&stmt.table, &schema, &row, &rows, Some(i))?;
            rows[i] = row;
        }

        self.store
            .persist_table(database, &stmt.table, &schema, &rows)?;

        Ok(ExecutionResult::with_affected_rows(
            matched.len(),
            format!("{} row(s) updated", matched.len()),
        ))
    }

    // ========== DELETE ==========

    fn execute_delete(&self, database: &str, stmt: DeleteStatement) -> Result<ExecutionResult> {
        let (schema, mut rows) = self.store.load_table(database, &stmt.table)?;

        let filter = bind_predicate(&schema, &stmt.table, &stmt.where_clause)?;

        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        let removed = before - rows.len();

        if removed > 0 {
            self.store
                .persist_table(database, &stmt.table, &schema, &rows)?;
        }

        Ok(ExecutionResult::with_affected_rows(
            removed,
            format!("{} row(s) deleted", removed),
        ))
    }
}

// ========== Grouping ==========

/// One result column of a grouped SELECT
enum GroupOutput {
    /// The GROUP BY value
    Key,
    Count(Option<usize>),
    Sum(usize, DataType),
    Avg(usize),
}

impl GroupOutput {
    fn bind(schema: &Schema, table: &str, aggregate: &Aggregate) -> Result<Self> {
        let index = match &aggregate.column {
            Some(name) => column_index(schema, table, name)?,
            None => return Ok(GroupOutput::Count(None)),
        };
        let data_type = schema.columns()[index].data_type;

        match aggregate.function {
            AggregateFunction::Count => Ok(GroupOutput::Count(Some(index))),
            AggregateFunction::Sum | AggregateFunction::Avg
                if !matches!(data_type, DataType::Int | DataType::Decimal) =>
            {
                Err(Error::InvalidAggregate {
                    function: aggregate.function.to_string(),
                    column: schema.columns()[index].name.clone(),
                    data_type: data_type.to_string(),
                })
            }
            AggregateFunction::Sum => Ok(GroupOutput::Sum(index, data_type)),
            AggregateFunction::Avg => Ok(GroupOutput::Avg(index)),
        }
    }

    /// Fold a group into one value. NULLs are skipped by every aggregate
    /// except `COUNT(*)`; SUM and AVG of no values are zero.
    fn evaluate(&self, key: &Value, rows: &[Row], schema: &Schema) -> Result<Value> {
        match *self {
            GroupOutput::Key => Ok(key.clone()),
            GroupOutput::Count(None) => Ok(Value::Integer(rows.len() as i64)),
            GroupOutput::Count(Some(index)) => {
                Ok(Value::Integer(non_null(rows, index).count() as i64))
            }
            GroupOutput::Sum(index, DataType::Int) => {
                let mut total: i64 = 0;
                for value in non_null(rows, index) {
                    if let Value::Integer(n) = value {
                        total = total.checked_add(*n).ok_or_else(|| {
                            Error::NumericOverflow(format!(
                                "SUM({})",
                                schema.columns()[index].name
                            ))
                        })?;
                    }
                }
                Ok(Value::Integer(total))
            }
            GroupOutput::Sum(index, _) => Ok(Value::Decimal(
                non_null(rows, index).filter_map(as_f64).fold(0.0, |a, b| a + b),
            )),
            GroupOutput::Avg(index) => {
                let values: Vec<f64> = non_null(rows, index).filter_map(as_f64).collect();
                if values.is_empty() {
                    return Ok(Value::Decimal(0.0));
                }
                let total = values.iter().fold(0.0, |a, b| a + b);
                Ok(Value::Decimal(total / values.len() as f64))
            }
        }
    }
}

fn non_null(rows: &[Row], index: usize) -> impl Iterator<Item = &Value> {
    rows.iter()
        .filter_map(move |row| row.get(index))
        .filter(|value| !value.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Decimal(n) => Some(*n),
        _ => None,
    }
}

/// A grouped SELECT resolved against a schema. Groups are formed from the
/// rows that passed WHERE, in order of first appearance; ORDER BY and LIMIT
/// then apply to the grouped result, and ORDER BY names a result column.
struct Grouping<'a> {
    schema: &'a Schema,
    table: &'a str,
    key: Option<usize>,
    columns: Vec<String>,
    outputs: Vec<GroupOutput>,
    order_by: Option<&'a OrderBy>,
    limit: Option<usize>,
}

impl<'a> Grouping<'a> {
    fn bind(schema: &'a Schema, stmt: &'a SelectStatement) -> Result<Self> {
        stmt.check_grouping().map_err(Error::InvalidGrouping)?;

        let key = stmt
            .group_by
            .as_ref()
            .map(|name| column_index(schema, &stmt.table, name))
            .transpose()?;

        let mut columns = Vec::new();
        let mut outputs = Vec::new();
        if let Projection::Columns(items) = &stmt.projection {
            for item in items {
                columns.push(item.output_name());
                outputs.push(match item {
                    SelectItem::Column(_) => GroupOutput::Key,
                    SelectItem::Aggregate(aggregate) => {
                        GroupOutput::bind(schema, &stmt.table, aggregate)?
                    }
                });
            }
        }

        Ok(Self {
            schema,
            table: &stmt.table,
            key,
            columns,
            outputs,
            order_by: stmt.order_by.as_ref(),
            limit: stmt.limit,
        })
    }

    fn apply(self, rows: Vec<Row>) -> Result<(Vec<String>, Vec<Row>)> {
        let order = self
            .order_by
            .map(|o| {
                self.columns
                    .iter()
                    .position(|c| *c == o.column)
                    .map(|i| (i, o.ascending))
                    .ok_or_else(|| Error::ColumnNotFound(o.column.clone(), self.table.to_string()))
            })
            .transpose()?;

        // Without GROUP BY the whole input is one group, even when empty
        let mut groups: IndexMap<Value, Vec<Row>> = IndexMap::new();
        match self.key {
            Some(index) => {
                for row in rows {
                    let key = row.get(index).cloned().unwrap_or(Value::Null);
                    groups.entry(key).or_default().push(row);
                }
            }
            None => {
                groups.insert(Value::Null, rows);
            }
        }

        let mut result = groups
            .iter()
            .map(|(key, members)| {
                self.outputs
                    .iter()
                    .map(|output| output.evaluate(key, members, self.schema))
                    .collect::<Result<Vec<_>>>()
                    .map(Row::new)
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some((index, ascending)) = order {
            sort_rows(&mut result, index, ascending);
        }
        if let Some(limit) = self.limit {
            result.truncate(limit);
        }

        Ok((self.columns, result))
    }
}

/// Stable sort on one column, so ties keep their current order
fn sort_rows(rows: &mut [Row], index: usize, ascending: bool) {
    rows.sort_by(|a, b| {
        let ordering = match (a.get(index), b.get(index)) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

// ========== Predicates & Constraints ==========

/// A WHERE predicate resolved against a schema
struct Filter {
    index: usize,
    value: Value,
}

impl Filter {
    fn matches(&self, row: &Row) -> bool {
        row.get(self.index)
            .is_some_and(|value| value.sql_eq(&self.value))
    }
}

fn bind_predicate(schema: &Schema, table: &str, predicate: &Predicate) -> Result<Filter> {
    let index = column_index(schema, table, &predicate.column)?;
    // A string longer than a VARCHAR column simply matches nothing
    let data_type = match schema.columns()[index].data_type {
        DataType::Varchar(_) => DataType::Text,
        other => other,
    };
    let value = crate::catalog::coerce(&predicate.value, &data_type)?;
    Ok(Filter { index, value })
}

fn column_index(schema: &Schema, table: &str, column: &str) -> Result<usize> {
    schema
        .get_column_index(column)
        .ok_or_else(|| Error::ColumnNotFound(column.to_string(), table.to_string()))
}

/// Check NOT NULL, UNIQUE and PRIMARY KEY for `row` against `rows`, ignoring
/// the row at `skip` (the row's own previous version on UPDATE).
fn check_constraints(
    table: &str,
    schema: &Schema,
    row: &Row,
    rows: &[Row],
    skip: Option<usize>,
) -> Result<()> {
    for (index, column) in schema.columns().iter().enumerate() {
        let value = row.get(index).unwrap_or(&Value::Null);

        if value.is_null() {
            if column.is_not_null() {
                return Err(Error::NullNotAllowed(column.name.clone()));
            }
            continue;
        }

        if !column.is_unique() {
            continue;
        }

        let duplicate = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, other)| other.get(index).is_some_and(|v| v.sql_eq(value)));

        if duplicate {
            let (table, column, value) = (
                table.to_string(),
                column.name.clone(),
                display_value(value),
            );
            return Err(if schema.columns()[index].is_primary_key() {
                Error::PrimaryKeyViolation {
                    table,
                    column,
                    value,
                }
            } else {
                Error::UniqueViolation {
                    table,
                    column,
                    value,
                }
            });
        }
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s),
        Value::Date(d) => format!("'{}'", d),
        other => other.to_string(),
    }
}

fn reject(database: &str, err: &Error) -> ExecutionResult {
    let kind = err.kind();
    if kind.is_fatal() {
        error!(database = %database, kind = %kind, error = %err, "statement failed");
    } else {
        warn!(database = %database, kind = %kind, error = %err, "statement rejected");
    }
    ExecutionResult::from_error(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_engine() -> (TempDir, ExecutionEngine) {
        let dir = tempfile::Builder::new().prefix("tabledb").tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        store.create_database("shop").unwrap();
        (dir, ExecutionEngine::new(store))
    }

    fn run_ok(engine: &ExecutionEngine, sql: &str) -> ExecutionResult {
        let result = engine.execute("shop", sql);
        assert!(result.is_success(), "{}: {}", sql, result.message);
        result
    }

    fn error_kind(engine: &ExecutionEngine, sql: &str) -> ErrorKind {
        let result = engine.execute("shop", sql);
        assert_eq!(result.kind, ResultKind::Error, "{} unexpectedly succeeded", sql);
        result.error_kind.unwrap()
    }

    fn setup_items(engine: &ExecutionEngine) {
        run_ok(
            engine,
            "CREATE TABLE items (id INT PRIMARY KEY, grp INT, code INT UNIQUE, label VARCHAR(5))",
        );
        run_ok(engine, "INSERT INTO items VALUES (1, 1, 10, 'a')");
        run_ok(engine, "INSERT INTO items VALUES (2, 1, 20, 'b')");
        run_ok(engine, "INSERT INTO items VALUES (3, 2, NULL, NULL)");
    }

    #[test]
    fn test_create_table() {
        let (_dir, engine) = create_test_engine();

        let result = run_ok(&engine, "CREATE TABLE users (id INT PRIMARY KEY, name TEXT)");
        assert!(result.message.contains("created"));
        assert_eq!(
            error_kind(&engine, "CREATE TABLE users (id INT)"),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            error_kind(&engine, "CREATE TABLE dup (a INT, a TEXT)"),
            ErrorKind::Schema
        );
        assert_eq!(
            error_kind(&engine, "CREATE TABLE two (a INT PRIMARY KEY, b INT PRIMARY KEY)"),
            ErrorKind::Schema
        );
    }

    #[test]
    fn test_insert_and_select() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "SELECT * FROM items");
        assert_eq!(result.columns, vec!["id", "grp", "code", "label"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(
            result.rows[0].values(),
            &[
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(10),
                Value::from("a")
            ]
        );

        let result = run_ok(&engine, "SELECT label, id FROM items WHERE grp = 1 LIMIT 1");
        assert_eq!(result.columns, vec!["label", "id"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.records()[0]["id"], Value::Integer(1));
    }

    #[test]
    fn test_insert_errors_leave_table_unchanged() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (1, 9, 99, 'x')"),
            ErrorKind::Constraint
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (NULL, 9, 99, 'x')"),
            ErrorKind::Constraint
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (4, 9, 10, 'x')"),
            ErrorKind::Constraint
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (4, 9)"),
            ErrorKind::Arity
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES ('four', 9, 99, 'x')"),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (4.5, 9, 99, 'x')"),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            error_kind(&engine, "INSERT INTO items VALUES (4, 9, 99, 'toolong')"),
            ErrorKind::TypeMismatch
        );

        assert_eq!(run_ok(&engine, "SELECT * FROM items").rows.len(), 3);
    }

    #[test]
    fn test_unique_allows_many_nulls() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        run_ok(&engine, "INSERT INTO items VALUES (4, 2, NULL, NULL)");
        let result = run_ok(&engine, "SELECT * FROM items WHERE code = NULL");
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_update() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "UPDATE items SET label = 'z', grp = 7 WHERE grp = 1");
        assert_eq!(result.affected_rows, 2);

        let result = run_ok(&engine, "SELECT id FROM items WHERE grp = 7");
        assert_eq!(result.rows.len(), 2);

        // Setting a unique value to itself is not a conflict
        let result = run_ok(&engine, "UPDATE items SET code = 10 WHERE id = 1");
        assert_eq!(result.affected_rows, 1);

        let result = run_ok(&engine, "UPDATE items SET code = 5 WHERE id = 99");
        assert_eq!(result.affected_rows, 0);
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        // The first matched row would succeed on its own, the second then
        // collides with it.
        assert_eq!(
            error_kind(&engine, "UPDATE items SET code = 5 WHERE grp = 1"),
            ErrorKind::Constraint
        );
        assert_eq!(
            error_kind(&engine, "UPDATE items SET id = 3 WHERE id = 1"),
            ErrorKind::Constraint
        );
        assert_eq!(
            error_kind(&engine, "UPDATE items SET id = NULL WHERE id = 1"),
            ErrorKind::Constraint
        );

        let result = run_ok(&engine, "SELECT code FROM items WHERE grp = 1");
        assert_eq!(
            result.rows,
            vec![
                Row::new(vec![Value::Integer(10)]),
                Row::new(vec![Value::Integer(20)]),
            ]
        );
    }

    #[test]
    fn test_delete() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "DELETE FROM items WHERE grp = 1");
        assert_eq!(result.affected_rows, 2);
        assert!(run_ok(&engine, "SELECT * FROM items WHERE grp = 1").rows.is_empty());

        let result = run_ok(&engine, "DELETE FROM items WHERE grp = 1");
        assert_eq!(result.affected_rows, 0);
    }

    #[test]
    fn test_order_by() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let ids = |sql: &str| -> Vec<Value> {
            run_ok(&engine, sql)
                .rows
                .iter()
                .map(|r| r.get(0).cloned().unwrap())
                .collect()
        };

        assert_eq!(
            ids("SELECT id FROM items ORDER BY code"),
            vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            ids("SELECT id FROM items ORDER BY code DESC LIMIT 2"),
            vec![Value::Integer(2), Value::Integer(1)]
        );
        // Ties keep storage order
        assert_eq!(
            ids("SELECT id FROM items ORDER BY grp DESC"),
            vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]
        );
    }

    #[test]
    fn test_group_by_aggregates() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(
            &engine,
            "SELECT grp, COUNT(*), COUNT(code), SUM(code), AVG(code) FROM items GROUP BY grp",
        );
        assert_eq!(
            result.columns,
            vec!["grp", "count", "count_code", "sum_code", "avg_code"]
        );
        assert_eq!(
            result.rows,
            vec![
                Row::new(vec![
                    Value::Integer(1),
                    Value::Integer(2),
                    Value::Integer(2),
                    Value::Integer(30),
                    Value::Decimal(15.0),
                ]),
                Row::new(vec![
                    Value::Integer(2),
                    Value::Integer(1),
                    Value::Integer(0),
                    Value::Integer(0),
                    Value::Decimal(0.0),
                ]),
            ]
        );

        // NULL keys form one group
        let result = run_ok(&engine, "SELECT code, COUNT(*) FROM items GROUP BY code");
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[2].values(), &[Value::Null, Value::Integer(1)]);
    }

    #[test]
    fn test_aggregates_without_group_by() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "SELECT COUNT(*) FROM items WHERE grp = 1");
        assert_eq!(result.rows, vec![Row::new(vec![Value::Integer(2)])]);

        // An empty input still yields one row
        let result = run_ok(&engine, "SELECT COUNT(*), SUM(id) FROM items WHERE grp = 9");
        assert_eq!(
            result.rows,
            vec![Row::new(vec![Value::Integer(0), Value::Integer(0)])]
        );
    }

    #[test]
    fn test_grouped_order_and_limit() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);
        run_ok(&engine, "INSERT INTO items VALUES (4, 3, 40, 'd')");

        let result = run_ok(
            &engine,
            "SELECT grp, COUNT(*) FROM items GROUP BY grp ORDER BY count DESC LIMIT 1",
        );
        assert_eq!(
            result.rows,
            vec![Row::new(vec![Value::Integer(1), Value::Integer(2)])]
        );

        let result = run_ok(&engine, "SELECT grp FROM items GROUP BY grp ORDER BY grp DESC");
        let keys: Vec<Value> = result.rows.iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(
            keys,
            vec![Value::Integer(3), Value::Integer(2), Value::Integer(1)]
        );

        // ORDER BY names a result column once rows are grouped
        assert_eq!(
            error_kind(&engine, "SELECT grp FROM items GROUP BY grp ORDER BY id"),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_aggregate_errors() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        assert_eq!(
            error_kind(&engine, "SELECT SUM(label) FROM items"),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            error_kind(&engine, "SELECT AVG(missing) FROM items"),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(&engine, "SELECT missing FROM items GROUP BY missing"),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(&engine, "SELECT label FROM items GROUP BY grp"),
            ErrorKind::Syntax
        );

        run_ok(&engine, "INSERT INTO items VALUES (5, 1, 9223372036854775807, 'm')");
        assert_eq!(
            error_kind(&engine, "SELECT SUM(code) FROM items"),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_grouping_checked_for_built_statements() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let statement = Statement::Select(SelectStatement {
            projection: Projection::Wildcard,
            table: "items".to_string(),
            where_clause: None,
            group_by: Some("grp".to_string()),
            order_by: None,
            limit: None,
        });
        let err = engine.execute_statement("shop", statement).unwrap_err();
        assert!(matches!(err, Error::InvalidGrouping(_)));
    }

    #[test]
    fn test_lookup_errors() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        assert_eq!(error_kind(&engine, "SELECT * FROM nope"), ErrorKind::NotFound);
        assert_eq!(
            error_kind(&engine, "SELECT missing FROM items"),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(&engine, "SELECT * FROM items ORDER BY missing"),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(&engine, "UPDATE items SET missing = 1 WHERE id = 1"),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(&engine, "DELETE FROM items WHERE missing = 1"),
            ErrorKind::NotFound
        );

        let result = engine.execute("nowhere", "SELECT * FROM items");
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_predicate_coercion() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        assert_eq!(
            error_kind(&engine, "SELECT * FROM items WHERE id = 'one'"),
            ErrorKind::TypeMismatch
        );
        // Longer than the column can hold, so nothing can match
        assert!(run_ok(&engine, "SELECT * FROM items WHERE label = 'abcdefgh'")
            .rows
            .is_empty());
    }

    #[test]
    fn test_syntax_errors_are_results() {
        let (_dir, engine) = create_test_engine();

        let result = engine.execute("shop", "DELETE FROM items");
        assert_eq!(result.kind, ResultKind::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::Syntax));
        assert!(result.message.contains("WHERE"));

        assert_eq!(error_kind(&engine, "FROB items"), ErrorKind::Syntax);
    }

    #[test]
    fn test_drop_table() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        run_ok(&engine, "DROP TABLE items");
        assert_eq!(error_kind(&engine, "SELECT * FROM items"), ErrorKind::NotFound);
        assert_eq!(error_kind(&engine, "DROP TABLE items"), ErrorKind::NotFound);
    }

    #[test]
    fn test_execute_batch() {
        let (_dir, engine) = create_test_engine();

        let results = engine.execute_batch(
            "shop",
            "CREATE TABLE t (id INT PRIMARY KEY);
             INSERT INTO t VALUES (1);
             INSERT INTO t VALUES (1);
             INSERT INTO t VALUES (2);",
        );
        let kinds: Vec<ResultKind> = results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResultKind::Success,
                ResultKind::Success,
                ResultKind::Error,
                ResultKind::Success
            ]
        );

        let results = engine.execute_batch("shop", "SELECT * FROM t; SELEC * FROM t");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_kind, Some(ErrorKind::Syntax));
    }

    #[test]
    fn test_result_serialization() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "SELECT id, label FROM items WHERE id = 1");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "Success");
        assert_eq!(json["rows"][0][0]["Integer"], 1);
        assert!(json.get("error_kind").is_none());

        assert!(json["execution_time"]["nanos"].is_u64());

        let failed = engine.execute("shop", "SELECT * FROM nope");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error_kind"], "NotFound");
    }

    #[test]
    fn test_execution_time_recorded() {
        let (_dir, engine) = create_test_engine();
        setup_items(&engine);

        let result = run_ok(&engine, "SELECT * FROM items");
        assert!(result.execution_time > Duration::ZERO);

        for result in engine.execute_batch("shop", "SELECT * FROM items; DROP TABLE nope") {
            assert!(result.execution_time > Duration::ZERO);
        }
    }
}
