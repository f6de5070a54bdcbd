//! TableDB - CLI Client
//!
//! An interactive shell over a local data directory. Statements are
//! terminated by `;` and may span several lines; lines starting with `.` are
//! shell commands. Command history is stored in ~/.tabledb_history.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use tabledb::config::{EngineConfig, ENV_LOG};
use tabledb::executor::{ExecutionEngine, ExecutionResult};
use tabledb::storage::Row;

/// Print welcome banner
fn print_banner(config: &EngineConfig) {
    println!(
        r#"
 _____     _     _      ____  ____
|_   _|_ _| |__ | | ___|  _ \| __ )
  | |/ _` | '_ \| |/ _ \ | | |  _ \
  | | (_| | |_) | |  __/ |_| | |_) |
  |_|\__,_|_.__/|_|\___|____/|____/

 Data directory: {}
 Type '.help' for help, '.quit' to exit
"#,
        config.data_dir.display()
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help              Show this help message
  .quit              Exit TableDB
  .databases         List all databases
  .create <db>       Create a database
  .drop <db>         Drop a database and all of its tables
  .use <db>          Select the current database
  .tables            List tables in the current database
  .schema [table]    Show table schema
  .stats [table]     Show row counts for the database or one table
  .clear             Clear screen

SQL Commands:
  CREATE TABLE ...   Create a new table
  DROP TABLE ...     Drop a table
  INSERT INTO ...    Insert a row
  SELECT ...         Query data (GROUP BY with COUNT, SUM, AVG)
  UPDATE ...         Update rows (WHERE required)
  DELETE FROM ...    Delete rows (WHERE required)

Examples:
  CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(100) NOT NULL);
  INSERT INTO users VALUES (1, 'Alice');
  SELECT * FROM users WHERE id = 1;
  SELECT city, COUNT(*) FROM users GROUP BY city;
"#
    );
}

fn print_usage() {
    println!("Usage: tabledb-cli [--data-dir <path>] [--database <name>]");
}

/// Format query results as a table
fn format_results(columns: &[String], rows: &[Row]) -> String {
    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();

    for row in rows {
        for (i, value) in row.values().iter().enumerate() {
            if i < widths.len() {
                let value_len = value.to_string().chars().count();
                widths[i] = widths[i].max(value_len);
            }
        }
    }

    let mut output = String::new();

    // Header separator
    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    // Header
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    // Rows
    for row in rows {
        let row_str: String = row
            .values()
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", row_str));
    }

    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", rows.len()));

    output
}

fn print_result(result: &ExecutionResult) {
    let elapsed = result.execution_time.as_secs_f64();
    if let Some(kind) = result.error_kind {
        eprintln!("{}: {}", kind, result.message);
    } else if !result.columns.is_empty() {
        print!("{}", format_results(&result.columns, &result.rows));
        println!("({:.3} sec)", elapsed);
    } else {
        println!("{} ({:.3} sec)", result.message, elapsed);
    }
}

/// What the REPL should do after a command
enum Flow {
    Continue,
    Quit,
}

/// Shell state: the engine and the selected database
struct Session {
    engine: ExecutionEngine,
    database: Option<String>,
}

impl Session {
    fn prompt(&self, in_multiline: bool) -> String {
        match (&self.database, in_multiline) {
            (_, true) => "...> ".to_string(),
            (Some(db), false) => format!("tabledb:{}> ", db),
            (None, false) => "tabledb> ".to_string(),
        }
    }

    /// Execute a SQL statement (or several, separated by `;`)
    fn execute_sql(&self, sql: &str) {
        let sql = sql.trim();
        if sql.is_empty() {
            return;
        }

        let Some(database) = &self.database else {
            eprintln!("No database selected. Use '.use <db>' or '.create <db>' first.");
            return;
        };

        for result in self.engine.execute_batch(database, sql) {
            print_result(&result);
        }
    }

    fn current_database(&self) -> Result<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| anyhow!("no database selected"))
    }

    /// Handle special dot commands
    fn handle_special_command(&mut self, cmd: &str) -> Result<Flow> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let store = self.engine.store();

        match (parts.first().copied(), parts.get(1).copied()) {
            (Some(".help"), _) => print_help(),
            (Some(".quit") | Some(".exit"), _) => return Ok(Flow::Quit),
            (Some(".databases"), _) => {
                let databases = store.list_databases()?;
                if databases.is_empty() {
                    println!("No databases found.");
                }
                for db in databases {
                    let marker = if Some(&db) == self.database.as_ref() { "*" } else { " " };
                    println!(" {} {}", marker, db);
                }
            }
            (Some(".create"), Some(db)) => {
                store.create_database(db)?;
                println!("Database '{}' created", db);
                self.database = Some(db.to_string());
            }
            (Some(".drop"), Some(db)) => {
                store.drop_database(db)?;
                println!("Database '{}' dropped", db);
                if self.database.as_deref() == Some(db) {
                    self.database = None;
                }
            }
            (Some(".use"), Some(db)) => {
                if !store.database_exists(db) {
                    bail!("database '{}' not found", db);
                }
                self.database = Some(db.to_string());
            }
            (Some(".tables"), _) => {
                let tables = store.list_tables(self.current_database()?)?;
                if tables.is_empty() {
                    println!("No tables found.");
                } else {
                    println!("Tables:");
                    for table in tables {
                        println!("  {}", table);
                    }
                }
            }
            (Some(".schema"), table) => {
                let database = self.current_database()?;
                let tables = match table {
                    Some(t) => vec![t.to_string()],
                    None => store.list_tables(database)?,
                };
                for table in tables {
                    let schema = store.load_schema(database, &table)?;
                    let columns: Vec<String> = schema
                        .columns()
                        .iter()
                        .map(|c| format!("  {}", c))
                        .collect();
                    println!("CREATE TABLE {} (\n{}\n);", table, columns.join(",\n"));
                }
            }
            (Some(".stats"), Some(table)) => {
                let stats = store.table_stats(self.current_database()?, table)?;
                println!(
                    "Table '{}': {} column(s), {} row(s)",
                    stats.name, stats.column_count, stats.row_count
                );
            }
            (Some(".stats"), None) => {
                let stats = store.database_stats(self.current_database()?)?;
                println!("Database '{}':", stats.name);
                for table in &stats.tables {
                    println!(
                        "  {:<20} {} column(s), {} row(s)",
                        table.name, table.column_count, table.row_count
                    );
                }
                println!(
                    "{} table(s), {} row(s) total",
                    stats.tables.len(),
                    stats.total_rows
                );
            }
            (Some(".clear"), _) => {
                // Clear screen (ANSI escape code)
                print!("\x1B[2J\x1B[1;1H");
                io::stdout().flush()?;
            }
            (Some(cmd @ (".create" | ".drop" | ".use")), None) => {
                bail!("{} requires an argument; type '.help' for usage", cmd);
            }
            (Some(cmd), _) => {
                bail!("unknown command: {}; type '.help' for available commands", cmd);
            }
            (None, _) => {}
        }

        Ok(Flow::Continue)
    }
}

/// Main REPL loop
fn run_repl(mut session: Session) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_path =
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".tabledb_history"));
    if let Some(path) = &history_path {
        match editor.load_history(path) {
            Ok(()) => {}
            Err(ReadlineError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut input_buffer = String::new();

    loop {
        let in_multiline = !input_buffer.is_empty();
        let line = match editor.readline(&session.prompt(in_multiline)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                input_buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();

        // Handle special commands
        if !in_multiline && trimmed.starts_with('.') {
            editor.add_history_entry(trimmed)?;
            match session.handle_special_command(trimmed) {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Quit) => break,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    continue;
                }
            }
        }

        // Handle empty input
        if trimmed.is_empty() {
            if in_multiline {
                // Empty line in multiline mode - execute the buffer
                let sql = std::mem::take(&mut input_buffer);
                editor.add_history_entry(sql.trim())?;
                session.execute_sql(&sql);
            }
            continue;
        }

        // Accumulate input
        input_buffer.push_str(&line);
        input_buffer.push('\n');

        // Check if statement is complete (ends with semicolon)
        if trimmed.ends_with(';') {
            let sql = std::mem::take(&mut input_buffer);
            editor.add_history_entry(sql.trim())?;
            session.execute_sql(&sql);
        }
    }

    if let Some(path) = &history_path {
        editor.save_history(path)?;
    }

    println!("Goodbye!");
    Ok(())
}

/// Apply command-line flags on top of the environment configuration
fn parse_args(mut config: EngineConfig) -> Result<Option<EngineConfig>> {
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => {
                let dir = args.next().ok_or_else(|| anyhow!("--data-dir requires a path"))?;
                config = config.data_dir(dir);
            }
            "--database" => {
                let db = args.next().ok_or_else(|| anyhow!("--database requires a name"))?;
                config = config.default_database(db);
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }

    Ok(Some(config))
}

fn init_tracing(config: &EngineConfig) -> Result<()> {
    // TABLEDB_LOG (already folded into the config) wins over RUST_LOG
    let filter = if std::env::var_os(ENV_LOG).is_some() {
        EnvFilter::try_new(&config.log_filter)?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let Some(config) = parse_args(EngineConfig::from_env())? else {
        return Ok(());
    };
    init_tracing(&config)?;

    let engine = ExecutionEngine::from_config(&config)?;
    let database = match config.default_database.clone() {
        Some(db) if !engine.store().database_exists(&db) => {
            eprintln!("Warning: database '{}' not found", db);
            None
        }
        other => other,
    };

    print_banner(&config);
    run_repl(Session { engine, database })
}
