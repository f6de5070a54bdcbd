//! SQL Token definitions
//!
//! This module defines all tokens that can appear in TableDB statements.

use std::fmt;

/// SQL Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // ========== Keywords ==========
    // DDL Keywords
    Create,
    Drop,
    Table,

    // DML Keywords
    Select,
    Insert,
    Update,
    Delete,
    Into,
    Values,
    Set,
    From,
    Where,

    // Predicate connectives (recognized only to be rejected)
    And,
    Or,

    // Grouping, Ordering & Limiting
    Group,
    Order,
    By,
    Asc,
    Desc,
    Limit,

    // Constraints
    Primary,
    Key,
    Unique,
    Not,
    Null,

    // Boolean Literals
    True,
    False,

    // ========== Literals ==========
    /// Numeric literal, as written
    Number(String),
    /// String literal (single-quoted)
    StringLiteral(String),
    /// Identifier (table name, column name, type name)
    Identifier(String),

    // ========== Operators & Delimiters ==========
    /// =
    Eq,
    /// *
    Asterisk,
    /// (
    LParen,
    /// )
    RParen,
    /// ,
    Comma,
    /// ;
    Semicolon,

    // ========== Special ==========
    /// End of input
    Eof,
}

impl Token {
    /// Try to parse a keyword from a string
    pub fn from_keyword(s: &str) -> Option<Token> {
        match s.to_uppercase().as_str() {
            // DDL
            "CREATE" => Some(Token::Create),
            "DROP" => Some(Token::Drop),
            "TABLE" => Some(Token::Table),

            // DML
            "SELECT" => Some(Token::Select),
            "INSERT" => Some(Token::Insert),
            "UPDATE" => Some(Token::Update),
            "DELETE" => Some(Token::Delete),
            "INTO" => Some(Token::Into),
            "VALUES" => Some(Token::Values),
            "SET" => Some(Token::Set),
            "FROM" => Some(Token::From),
            "WHERE" => Some(Token::Where),

            "AND" => Some(Token::And),
            "OR" => Some(Token::Or),

            // Grouping, Ordering & Limiting
            "GROUP" => Some(Token::Group),
            "ORDER" => Some(Token::Order),
            "BY" => Some(Token::By),
            "ASC" => Some(Token::Asc),
            "DESC" => Some(Token::Desc),
            "LIMIT" => Some(Token::Limit),

            // Constraints
            "PRIMARY" => Some(Token::Primary),
            "KEY" => Some(Token::Key),
            "UNIQUE" => Some(Token::Unique),
            "NOT" => Some(Token::Not),
            "NULL" => Some(Token::Null),

            // Boolean Literals
            "TRUE" => Some(Token::True),
            "FALSE" => Some(Token::False),

            _ => None,
        }
    }

    /// Keywords that never start or end a clause where a column name is
    /// expected, so they may also be used as column names unquoted
    pub fn is_non_reserved(&self) -> bool {
        matches!(
            self,
            Token::Key
                | Token::Asc
                | Token::Desc
                | Token::Group
                | Token::Order
                | Token::By
                | Token::Limit
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Create => write!(f, "CREATE"),
            Token::Drop => write!(f, "DROP"),
            Token::Table => write!(f, "TABLE"),
            Token::Select => write!(f, "SELECT"),
            Token::Insert => write!(f, "INSERT"),
            Token::Update => write!(f, "UPDATE"),
            Token::Delete => write!(f, "DELETE"),
            Token::Into => write!(f, "INTO"),
            Token::Values => write!(f, "VALUES"),
            Token::Set => write!(f, "SET"),
            Token::From => write!(f, "FROM"),
            Token::Where => write!(f, "WHERE"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Group => write!(f, "GROUP"),
            Token::Order => write!(f, "ORDER"),
            Token::By => write!(f, "BY"),
            Token::Asc => write!(f, "ASC"),
            Token::Desc => write!(f, "DESC"),
            Token::Limit => write!(f, "LIMIT"),
            Token::Primary => write!(f, "PRIMARY"),
            Token::Key => write!(f, "KEY"),
            Token::Unique => write!(f, "UNIQUE"),
            Token::Not => write!(f, "NOT"),
            Token::Null => write!(f, "NULL"),
            Token::True => write!(f, "TRUE"),
            Token::False => write!(f, "FALSE"),
            Token::Number(n) => write!(f, "{}", n),
            Token::StringLiteral(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Eq => write!(f, "="),
            Token::Asterisk => write!(f, "*"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token together with the character offset it starts at and the source
/// text it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub token: Token,
    pub position: usize,
    pub text: String,
}
