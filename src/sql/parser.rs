//! SQL Parser
//!
//! This module parses SQL tokens into an AST. The grammar is deliberately
//! small: one table per statement and a single `column = literal` predicate.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Located, Token};
use crate::catalog::{parse_column_type, Column, Constraint};
use crate::error::{Error, Result};
use tracing::debug;

/// SQL Parser
pub struct Parser {
    tokens: Vec<Located>,
    position: usize,
}

impl Parser {
    /// Create a new parser from a SQL string
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;
        debug!(tokens = tokens.len(), "tokenized statement");

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse exactly one statement, with an optional trailing semicolon
    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = self.parse_statement()?;

        if self.check(&Token::Semicolon) {
            self.advance();
        }
        if !self.is_at_end() {
            return Err(self.unexpected("end of statement"));
        }

        Ok(stmt)
    }

    /// Parse a `;`-separated batch of statements
    pub fn parse_all(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            while self.check(&Token::Semicolon) {
                self.advance();
            }
            if self.is_at_end() {
                break;
            }

            statements.push(self.parse_statement()?);

            if !self.is_at_end() {
                self.expect(&Token::Semicolon)?;
            }
        }

        Ok(statements)
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Create => self.parse_create_table().map(Statement::CreateTable),
            Token::Drop => self.parse_drop_table().map(Statement::DropTable),
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Insert => self.parse_insert().map(Statement::Insert),
            Token::Update => self.parse_update().map(Statement::Update),
            Token::Delete => self.parse_delete().map(Statement::Delete),
            Token::Eof => Err(Error::ParseError {
                message: "empty statement".to_string(),
                position: self.current_position(),
            }),
            other => Err(Error::UnknownStatement {
                found: other.to_string(),
                position: self.current_position(),
            }),
        }
    }

    // ========== SELECT Statement ==========

    fn parse_select(&mut self) -> Result<SelectStatement> {
        let start = self.current_position();
        self.expect(&Token::Select)?;

        let projection = if self.check(&Token::Asterisk) {
            self.advance();
            Projection::Wildcard
        } else {
            Projection::Columns(self.parse_select_list()?)
        };

        self.expect(&Token::From)?;
        let table = self.expect_identifier()?;

        let where_clause = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_predicate()?)
        } else {
            None
        };

        let group_by = if self.check(&Token::Group) {
            self.advance();
            self.expect(&Token::By)?;
            Some(self.expect_column_name()?)
        } else {
            None
        };

        let order_by = if self.check(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            let column = self.expect_column_name()?;
            let ascending = match self.current() {
                Token::Asc => {
                    self.advance();
                    true
                }
                Token::Desc => {
                    self.advance();
                    false
                }
                _ => true,
            };
            Some(OrderBy { column, ascending })
        } else {
            None
        };

        let limit = if self.check(&Token::Limit) {
            self.advance();
            Some(self.expect_limit()?)
        } else {
            None
        };

        let select = SelectStatement {
            projection,
            table,
            where_clause,
            group_by,
            order_by,
            limit,
        };
        select
            .check_grouping()
            .map_err(|message| Error::ParseError {
                message,
                position: start,
            })?;

        Ok(select)
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];

        while self.check(&Token::Comma) {
            self.advance();
            items.push(self.parse_select_item()?);
        }

        Ok(items)
    }

    /// A column name, or `COUNT(*)` / `COUNT(col)` / `SUM(col)` / `AVG(col)`
    fn parse_select_item(&mut self) -> Result<SelectItem> {
        let function = match self.current() {
            Token::Identifier(name) if self.peek() == &Token::LParen => {
                AggregateFunction::from_name(name)
            }
            _ => None,
        };
        let Some(function) = function else {
            return self.expect_column_name().map(SelectItem::Column);
        };

        self.advance(); // function name
        self.expect(&Token::LParen)?;
        let column = if function == AggregateFunction::Count && self.check(&Token::Asterisk) {
            self.advance();
            None
        } else {
            Some(self.expect_column_name()?)
        };
        self.expect(&Token::RParen)?;

        Ok(SelectItem::Aggregate(Aggregate { function, column }))
    }

    // ========== INSERT Statement ==========

    fn parse_insert(&mut self) -> Result<InsertStatement> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;

        let table = self.expect_identifier()?;

        self.expect(&Token::Values)?;
        self.expect(&Token::LParen)?;

        let mut values = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                values.push(self.parse_literal()?);

                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.expect(&Token::RParen)?;

        Ok(InsertStatement { table, values })
    }

    // ========== UPDATE Statement ==========

    fn parse_update(&mut self) -> Result<UpdateStatement> {
        self.expect(&Token::Update)?;

        let table = self.expect_identifier()?;

        self.expect(&Token::Set)?;

        let mut assignments: Vec<(String, Literal)> = Vec::new();
        loop {
            let position = self.current_position();
            let column = self.expect_column_name()?;
            if assignments.iter().any(|(c, _)| *c == column) {
                return Err(Error::ParseError {
                    message: format!("column '{}' assigned more than once in SET", column),
                    position,
                });
            }
            self.expect(&Token::Eq)?;
            let value = self.parse_literal()?;
            assignments.push((column, value));

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        let where_clause = self.parse_required_where("UPDATE")?;

        Ok(UpdateStatement {
            table,
            assignments,
            where_clause,
        })
    }

    // ========== DELETE Statement ==========

    fn parse_delete(&mut self) -> Result<DeleteStatement> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;

        let table = self.expect_identifier()?;
        let where_clause = self.parse_required_where("DELETE")?;

        Ok(DeleteStatement {
            table,
            where_clause,
        })
    }

    // ========== CREATE / DROP TABLE ==========

    fn parse_create_table(&mut self) -> Result<CreateTableStatement> {
        self.expect(&Token::Create)?;
        self.expect(&Token::Table)?;

        let table = self.expect_identifier()?;

        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&Token::RParen)?;

        Ok(CreateTableStatement { table, columns })
    }

    /// `name TYPE[(n)] {PRIMARY KEY | UNIQUE | NOT NULL}*`
    fn parse_column_def(&mut self) -> Result<Column> {
        let name = self.expect_column_name()?;

        // Type names are identifiers; the text is rebuilt and validated by
        // the catalog so unknown types surface as schema errors.
        let mut type_text = self.expect_identifier_with("column type")?;
        if self.check(&Token::LParen) {
            self.advance();
            let mut params = Vec::new();
            while !self.check(&Token::RParen) {
                match self.current() {
                    Token::Eof => return Err(self.unexpected(")")),
                    token => params.push(token.to_string()),
                }
                self.advance();
            }
            self.advance(); // consume )
            type_text = format!("{}({})", type_text, params.join(""));
        }
        let data_type = parse_column_type(&type_text)?;

        let mut column = Column::new(name, data_type);

        // Repeated constraints are accepted and have no further effect
        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    self.expect(&Token::Key)?;
                    column = column.with(Constraint::PrimaryKey);
                }
                Token::Unique => {
                    self.advance();
                    column = column.with(Constraint::Unique);
                }
                Token::Not => {
                    self.advance();
                    self.expect(&Token::Null)?;
                    column = column.with(Constraint::NotNull);
                }
                _ => break,
            }
        }

        Ok(column)
    }

    fn parse_drop_table(&mut self) -> Result<DropTableStatement> {
        self.expect(&Token::Drop)?;
        self.expect(&Token::Table)?;

        let table = self.expect_identifier()?;

        Ok(DropTableStatement { table })
    }

    // ========== Predicates & Literals ==========

    fn parse_required_where(&mut self, verb: &'static str) -> Result<Predicate> {
        match self.current() {
            Token::Where => {
                self.advance();
                self.parse_predicate()
            }
            Token::Eof | Token::Semicolon => Err(Error::MissingWhere(verb)),
            _ => Err(self.unexpected("WHERE")),
        }
    }

    /// `column = literal`
    fn parse_predicate(&mut self) -> Result<Predicate> {
        let column = self.expect_column_name()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_literal()?;

        if matches!(self.current(), Token::And | Token::Or) {
            return Err(Error::ParseError {
                message: format!(
                    "{} is not supported; WHERE takes a single `column = value` predicate",
                    self.current()
                ),
                position: self.current_position(),
            });
        }

        Ok(Predicate { column, value })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let literal = match self.current() {
            Token::Number(n) => Literal::Number(n.clone()),
            Token::StringLiteral(s) => Literal::String(s.clone()),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,
            _ => return Err(self.unexpected("literal value")),
        };
        self.advance();
        Ok(literal)
    }

    // ========== Helper Methods ==========

    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|l| &l.token)
            .unwrap_or(&Token::Eof)
    }

    fn current_position(&self) -> usize {
        match self.tokens.get(self.position) {
            Some(l) => l.position,
            None => self.tokens.last().map(|l| l.position).unwrap_or(0),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position + 1)
            .map(|l| &l.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current().to_string(),
            position: self.current_position(),
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        self.expect_identifier_with("identifier")
    }

    fn expect_identifier_with(&mut self, expected: &str) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// A column name: an identifier, or a non-reserved keyword spelled as
    /// written
    fn expect_column_name(&mut self) -> Result<String> {
        let name = match self.tokens.get(self.position) {
            Some(Located {
                token: Token::Identifier(name),
                ..
            }) => name.clone(),
            Some(located) if located.token.is_non_reserved() => located.text.clone(),
            _ => return Err(self.unexpected("column name")),
        };
        self.advance();
        Ok(name)
    }

    fn expect_limit(&mut self) -> Result<usize> {
        let position = self.current_position();
        let text = match self.current() {
            Token::Number(n) => n.clone(),
            _ => return Err(self.unexpected("non-negative integer")),
        };

        let limit = if text.bytes().all(|b| b.is_ascii_digit()) {
            text.parse::<usize>().ok()
        } else {
            None
        };

        match limit {
            Some(n) => {
                self.advance();
                Ok(n)
            }
            None => Err(Error::ParseError {
                message: format!("LIMIT expects a non-negative integer, found {}", text),
                position,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::error::ErrorKind;

    fn parse(sql: &str) -> Result<Statement> {
        Parser::new(sql)?.parse()
    }

    #[test]
    fn test_parse_simple_select() {
        match parse("SELECT * FROM users").unwrap() {
            Statement::Select(s) => {
                assert_eq!(s.projection, Projection::Wildcard);
                assert_eq!(s.table, "users");
                assert!(s.where_clause.is_none());
                assert!(s.group_by.is_none());
                assert!(s.limit.is_none());
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_select_full() {
        let stmt = parse(
            "select id, name from users where active = TRUE order by name desc limit 10;",
        )
        .unwrap();

        match stmt {
            Statement::Select(s) => {
                assert_eq!(
                    s.projection,
                    Projection::Columns(vec!["id".into(), "name".into()])
                );
                assert_eq!(
                    s.where_clause,
                    Some(Predicate {
                        column: "active".to_string(),
                        value: Literal::Boolean(true),
                    })
                );
                assert_eq!(
                    s.order_by,
                    Some(OrderBy {
                        column: "name".to_string(),
                        ascending: false,
                    })
                );
                assert_eq!(s.limit, Some(10));
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_group_by() {
        let stmt = parse(
            "SELECT region, COUNT(*), count(email), Sum(total), AVG(total) FROM orders \
             WHERE paid = TRUE GROUP BY region ORDER BY count DESC LIMIT 3",
        )
        .unwrap();

        match stmt {
            Statement::Select(s) => {
                let aggregate = |function, column: Option<&str>| {
                    SelectItem::Aggregate(Aggregate {
                        function,
                        column: column.map(str::to_string),
                    })
                };
                assert_eq!(
                    s.projection,
                    Projection::Columns(vec![
                        "region".into(),
                        aggregate(AggregateFunction::Count, None),
                        aggregate(AggregateFunction::Count, Some("email")),
                        aggregate(AggregateFunction::Sum, Some("total")),
                        aggregate(AggregateFunction::Avg, Some("total")),
                    ])
                );
                assert_eq!(s.group_by.as_deref(), Some("region"));
                assert_eq!(s.order_by.unwrap().column, "count");
                assert_eq!(s.limit, Some(3));
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_aggregate_output_names() {
        let names: Vec<String> = match parse("SELECT COUNT(*), COUNT(a), SUM(a), AVG(a) FROM t")
            .unwrap()
        {
            Statement::Select(SelectStatement {
                projection: Projection::Columns(items),
                ..
            }) => items.iter().map(SelectItem::output_name).collect(),
            _ => panic!("Expected SELECT statement"),
        };
        assert_eq!(names, vec!["count", "count_a", "sum_a", "avg_a"]);
    }

    #[test]
    fn test_invalid_grouping() {
        for sql in [
            "SELECT g FROM t GROUP",
            "SELECT * FROM t GROUP BY g",
            "SELECT g, other FROM t GROUP BY g",
            "SELECT g, COUNT(*) FROM t",
            "SELECT SUM(*) FROM t",
            "SELECT COUNT() FROM t",
            "SELECT g FROM t ORDER BY g GROUP BY g",
        ] {
            assert_eq!(parse(sql).unwrap_err().kind(), ErrorKind::Syntax, "{}", sql);
        }
        // A plain column named like a function
        assert!(parse("SELECT count, sum FROM t").is_ok());
    }

    #[test]
    fn test_non_reserved_keywords_as_column_names() {
        match parse("CREATE TABLE k1 (id INT, key TEXT, Desc INT, limit INT)").unwrap() {
            Statement::CreateTable(ct) => {
                let names: Vec<&str> = ct.columns.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["id", "key", "Desc", "limit"]);
            }
            _ => panic!("Expected CREATE TABLE statement"),
        }

        match parse("SELECT key, order FROM k1 WHERE by = 1 ORDER BY desc DESC LIMIT 2").unwrap() {
            Statement::Select(s) => {
                assert_eq!(s.projection, Projection::Columns(vec!["key".into(), "order".into()]));
                assert_eq!(s.where_clause.unwrap().column, "by");
                assert_eq!(
                    s.order_by,
                    Some(OrderBy {
                        column: "desc".to_string(),
                        ascending: false,
                    })
                );
                assert_eq!(s.limit, Some(2));
            }
            _ => panic!("Expected SELECT statement"),
        }

        assert!(parse("UPDATE k1 SET key = 'a' WHERE asc = 1").is_ok());
        // Reserved words still need quoting
        assert!(parse("CREATE TABLE t (select INT)").is_err());
        assert!(parse("CREATE TABLE t (\"select\" INT)").is_ok());
    }

    #[test]
    fn test_parse_limit() {
        assert!(matches!(
            parse("SELECT * FROM t LIMIT 0").unwrap(),
            Statement::Select(SelectStatement { limit: Some(0), .. })
        ));

        for sql in [
            "SELECT * FROM t LIMIT -1",
            "SELECT * FROM t LIMIT 1.5",
            "SELECT * FROM t LIMIT 'x'",
        ] {
            assert_eq!(parse(sql).unwrap_err().kind(), ErrorKind::Syntax, "{}", sql);
        }
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = parse(
            "CREATE TABLE customers (
                id INT PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email varchar(100) UNIQUE UNIQUE,
                joined DATE,
                balance DECIMAL,
                notes TEXT,
                active BOOLEAN NOT NULL UNIQUE
            )",
        )
        .unwrap();

        match stmt {
            Statement::CreateTable(ct) => {
                assert_eq!(ct.table, "customers");
                assert_eq!(ct.columns.len(), 7);
                assert!(ct.columns[0].is_primary_key());
                assert_eq!(ct.columns[1].data_type, DataType::Varchar(100));
                assert!(ct.columns[1].is_not_null());
                assert_eq!(ct.columns[2].constraints.len(), 1);
                assert_eq!(ct.columns[3].data_type, DataType::Date);
                assert_eq!(ct.columns[4].data_type, DataType::Decimal);
                assert_eq!(ct.columns[5].data_type, DataType::Text);
                assert!(ct.columns[6].is_unique() && ct.columns[6].is_not_null());
            }
            _ => panic!("Expected CREATE TABLE statement"),
        }
    }

    #[test]
    fn test_parse_bad_column_types() {
        for sql in [
            "CREATE TABLE t (a BLOB)",
            "CREATE TABLE t (a VARCHAR)",
            "CREATE TABLE t (a VARCHAR(0))",
            "CREATE TABLE t (a VARCHAR(abc))",
            "CREATE TABLE t (a INT(4))",
        ] {
            assert_eq!(parse(sql).unwrap_err().kind(), ErrorKind::Schema, "{}", sql);
        }
        assert_eq!(
            parse("CREATE TABLE t (a VARCHAR(10").unwrap_err().kind(),
            ErrorKind::Syntax
        );
    }

    #[test]
    fn test_parse_insert() {
        match parse("INSERT INTO users VALUES (1, 'O''Brien', NULL, false, -2.5)").unwrap() {
            Statement::Insert(i) => {
                assert_eq!(i.table, "users");
                assert_eq!(
                    i.values,
                    vec![
                        Literal::Number("1".to_string()),
                        Literal::String("O'Brien".to_string()),
                        Literal::Null,
                        Literal::Boolean(false),
                        Literal::Number("-2.5".to_string()),
                    ]
                );
            }
            _ => panic!("Expected INSERT statement"),
        }
    }

    #[test]
    fn test_parse_update() {
        match parse("UPDATE users SET name = 'Charlie', age = 30 WHERE id = 1").unwrap() {
            Statement::Update(u) => {
                assert_eq!(u.table, "users");
                assert_eq!(u.assignments.len(), 2);
                assert_eq!(u.assignments[1].0, "age");
                assert_eq!(u.where_clause.column, "id");
            }
            _ => panic!("Expected UPDATE statement"),
        }
    }

    #[test]
    fn test_update_requires_where() {
        assert!(matches!(
            parse("UPDATE users SET name = 'x'"),
            Err(Error::MissingWhere("UPDATE"))
        ));
        assert!(matches!(
            parse("DELETE FROM users;"),
            Err(Error::MissingWhere("DELETE"))
        ));
    }

    #[test]
    fn test_duplicate_set_column() {
        let err = parse("UPDATE t SET a = 1, a = 2 WHERE id = 1").unwrap_err();
        assert!(matches!(err, Error::ParseError { position: 20, .. }));
    }

    #[test]
    fn test_parse_delete_and_drop() {
        match parse("DELETE FROM users WHERE id = 1").unwrap() {
            Statement::Delete(d) => {
                assert_eq!(d.table, "users");
                assert_eq!(d.where_clause.value, Literal::Number("1".to_string()));
            }
            _ => panic!("Expected DELETE statement"),
        }

        assert_eq!(
            parse("DROP TABLE users").unwrap(),
            Statement::DropTable(DropTableStatement {
                table: "users".to_string()
            })
        );
    }

    #[test]
    fn test_compound_predicates_rejected() {
        let err = parse("SELECT * FROM t WHERE a = 1 AND b = 2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("AND"));

        let err = parse("DELETE FROM t WHERE a = 1 OR a = 2").unwrap_err();
        assert!(err.to_string().contains("OR"));
    }

    #[test]
    fn test_unknown_statement() {
        let err = parse("  MERGE INTO t").unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownStatement { ref found, position: 2 } if found == "MERGE"
        ));
        assert!(err.to_string().contains("MERGE"));
    }

    #[test]
    fn test_trailing_tokens() {
        let err = parse("SELECT * FROM t garbage").unwrap_err();
        assert!(matches!(err, Error::UnexpectedToken { position: 16, .. }));
        assert!(parse("").is_err());
    }

    #[test]
    fn test_parse_all() {
        let statements = Parser::new(
            "CREATE TABLE t (id INT); INSERT INTO t VALUES (1);; SELECT * FROM t",
        )
        .unwrap()
        .parse_all()
        .unwrap();

        assert_eq!(statements.len(), 3);
        assert!(matches!(statements[0], Statement::CreateTable(_)));
        assert!(matches!(statements[2], Statement::Select(_)));

        assert!(Parser::new("SELECT * FROM t SELECT * FROM u")
            .unwrap()
            .parse_all()
            .is_err());
    }
}
