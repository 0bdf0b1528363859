//! SQL statement classification.
//!
//! Classifies raw SQL into the set of statement kinds it contains and the
//! schema each write lands in. The AST from sqlparser is used when the text
//! parses; otherwise classification falls back to the leading keyword of each
//! statement so malformed SQL still reaches the backend, which reports the
//! real error.
//!
//! Writes are tracked per statement: `INSERT INTO a.t ...; INSERT INTO b.t ...`
//! yields one insert target for `a` and one for `b`. Writes nested in a query
//! (`WITH ... INSERT`, or a data-modifying CTE) count as writes too.

use crate::models::{DatabaseType, QueryClassification, StatementKind};
use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, visit_relations};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use std::ops::ControlFlow;
use tracing::debug;

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Classify `sql` using the dialect of `db_type`.
///
/// Never fails: unparseable input is classified by keyword.
pub fn classify(sql: &str, db_type: DatabaseType) -> QueryClassification {
    let dialect = get_dialect(db_type);

    let mut classification = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => classify_statements(&statements, dialect.as_ref()),
        Err(e) => {
            debug!(error = %e, "SQL did not parse, classifying by keyword");
            classify_by_keyword(sql, dialect.as_ref())
        }
    };

    if classification.kinds.is_empty() {
        classification.kinds.insert(StatementKind::Other);
    }
    classification
}

fn classify_statements(statements: &[Statement], dialect: &dyn Dialect) -> QueryClassification {
    let mut classification = QueryClassification::default();
    // Schema selected by a preceding USE; unqualified writes after it land there.
    let mut current: Option<String> = None;
    for statement in statements {
        if let Statement::Use(_) = statement {
            current = statement_schema(statement);
            classification.record(&[StatementKind::Other], &[current.clone()]);
            continue;
        }
        record_statement(statement, current.as_deref(), dialect, &mut classification);
    }
    classification
}

fn record_statement(
    statement: &Statement,
    current: Option<&str>,
    dialect: &dyn Dialect,
    classification: &mut QueryClassification,
) {
    match statement {
        Statement::Query(query) => {
            classification.record(&[StatementKind::Select], &[relation_schema(statement)]);
            let mut writes = Vec::new();
            query_writes(query, &mut writes);
            for write in writes {
                record_statement(write, current, dialect, classification);
            }
        }
        // EXPLAIN ANALYZE runs the statement
        Statement::Explain {
            statement: inner,
            analyze: true,
            ..
        } => record_statement(inner, current, dialect, classification),
        _ => {
            let kinds = statement_kinds(statement);
            if kinds.iter().any(|k| k.write_operation().is_some()) {
                let schemas = with_current(statement_targets(statement, dialect), current);
                classification.record(&kinds, &schemas);
            } else {
                classification.record(&kinds, &[statement_schema(statement)]);
            }
        }
    }
}

/// Data-modifying statements nested in a query: the body of `WITH ... INSERT`,
/// PostgreSQL `WITH d AS (DELETE ... RETURNING *)`, and either side of a set
/// operation.
fn query_writes<'a>(query: &'a Query, writes: &mut Vec<&'a Statement>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            query_writes(&cte.query, writes);
        }
    }
    set_expr_writes(&query.body, writes);
}

fn set_expr_writes<'a>(body: &'a SetExpr, writes: &mut Vec<&'a Statement>) {
    match body {
        SetExpr::Insert(statement)
        | SetExpr::Update(statement)
        | SetExpr::Delete(statement)
        | SetExpr::Merge(statement) => {
            writes.push(statement)
        }
        SetExpr::Query(query) => query_writes(query, writes),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_writes(left, writes);
            set_expr_writes(right, writes);
        }
        _ => {}
    }
}

fn statement_kinds(statement: &Statement) -> Vec<StatementKind> {
    use StatementKind::*;

    match statement {
        Statement::Query(_) => vec![Select],
        Statement::Insert { .. } => vec![Insert],
        Statement::Update { .. } => vec![Update],
        Statement::Delete { .. } => vec![Delete],
        Statement::Merge { .. } => vec![Insert, Update, Delete],
        Statement::Truncate { .. } => vec![Truncate],
        Statement::Drop { .. } => vec![Drop],

        Statement::Explain { .. }
        | Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => vec![Select],

        // CREATE/ALTER/DROP families have many variants; their rendered
        // keyword is stable across them.
        other => {
            let rendered = other.to_string();
            let leading = rendered.split_whitespace().next().unwrap_or_default();
            kinds_for_keyword(leading).to_vec()
        }
    }
}

/// Kinds implied by the first keyword of a statement.
fn kinds_for_keyword(keyword: &str) -> &'static [StatementKind] {
    use StatementKind::*;

    match keyword.to_uppercase().as_str() {
        "SELECT" | "WITH" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "VALUES" => &[Select],
        "INSERT" | "REPLACE" => &[Insert],
        "UPDATE" => &[Update],
        "DELETE" => &[Delete],
        "MERGE" => &[Insert, Update, Delete],
        "CREATE" => &[Create],
        "ALTER" | "RENAME" => &[Alter],
        "DROP" => &[Drop],
        "TRUNCATE" => &[Truncate],
        _ => &[Other],
    }
}

fn statement_schema(statement: &Statement) -> Option<String> {
    match statement {
        Statement::Use(_) => {
            // USE db / USE DATABASE db / USE SCHEMA db
            let rendered = statement.to_string();
            rendered.split_whitespace().last().map(unquote)
        }
        Statement::Drop { names, .. } => names.iter().find_map(schema_of),
        Statement::Query(_)
        | Statement::Insert { .. }
        | Statement::Update { .. }
        | Statement::Delete { .. }
        | Statement::Merge { .. } => relation_schema(statement),
        _ => relation_schema(statement).or_else(|| schema_from_text(&statement.to_string())),
    }
}

/// Schemas of the objects a write statement modifies, one entry per object.
/// Tables it only reads from do not count.
fn statement_targets(statement: &Statement, dialect: &dyn Dialect) -> Vec<Option<String>> {
    match statement {
        Statement::Drop { names, .. } => names.iter().map(schema_of).collect(),
        _ => {
            let rendered = statement.to_string();
            match Tokenizer::new(dialect, &rendered).tokenize() {
                Ok(tokens) => write_targets(&significant(&tokens)),
                Err(_) => vec![statement_schema(statement)],
            }
        }
    }
}

/// Unqualified targets land in the schema selected by USE, if any.
fn with_current(schemas: Vec<Option<String>>, current: Option<&str>) -> Vec<Option<String>> {
    schemas
        .into_iter()
        .map(|schema| schema.or_else(|| current.map(String::from)))
        .collect()
}

/// First schema qualifier among the tables a statement reads or writes.
fn relation_schema(statement: &Statement) -> Option<String> {
    let mut schema = None;
    let _ = visit_relations(statement, |relation| match schema_of(relation) {
        Some(found) => {
            schema = Some(found);
            ControlFlow::Break(())
        }
        None => ControlFlow::Continue(()),
    });
    schema
}

/// Schema qualifier of a `schema.table` or `catalog.schema.table` name.
fn schema_of(name: &ObjectName) -> Option<String> {
    let parts = &name.0;
    if parts.len() < 2 {
        return None;
    }
    Some(unquote(&parts[parts.len() - 2].to_string()))
}

fn unquote(ident: &str) -> String {
    ident
        .trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']')
        .to_string()
}

// =============================================================================
// Token scanning
// =============================================================================

/// Keywords after which a table (or schema-qualified table) name follows.
const TABLE_ANCHORS: &[&str] = &[
    "INTO", "UPDATE", "FROM", "JOIN", "TABLE", "EXISTS", "VIEW", "INDEX", "TRUNCATE",
];

/// Keywords after which the object a write modifies is named. `ON` covers
/// `CREATE INDEX i ON t` and `CREATE TRIGGER ... ON t`.
const WRITE_ANCHORS: &[&str] = &[
    "INSERT", "INTO", "UPDATE", "FROM", "TABLE", "VIEW", "TRUNCATE", "ON",
];

/// Modifiers that may sit between a write anchor and the object name.
const TARGET_MODIFIERS: &[&str] = &[
    "IF", "NOT", "EXISTS", "TABLE", "ONLY", "INTO", "IGNORE", "OR", "REPLACE", "ROLLBACK",
    "ABORT", "FAIL", "LOW_PRIORITY", "HIGH_PRIORITY", "DELAYED", "QUICK",
];

fn significant(tokens: &[Token]) -> Vec<&Token> {
    tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect()
}

fn classify_by_keyword(sql: &str, dialect: &dyn Dialect) -> QueryClassification {
    let tokens = match Tokenizer::new(dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(_) => {
            let kinds: Vec<StatementKind> = sql
                .split(';')
                .filter_map(|chunk| chunk.split_whitespace().next())
                .flat_map(|word| kinds_for_keyword(word).iter().copied())
                .collect();
            return QueryClassification::new(kinds, None);
        }
    };

    let mut classification = QueryClassification::default();
    let mut current: Option<String> = None;
    for statement in significant(&tokens).split(|t| matches!(t, Token::SemiColon)) {
        let Some(Token::Word(first)) = statement.first() else {
            continue;
        };

        if first.value.eq_ignore_ascii_case("USE") {
            current = statement.iter().skip(1).find_map(|t| match t {
                Token::Word(w) if !is_keyword(w, &["DATABASE", "SCHEMA"]) => Some(w.value.clone()),
                _ => None,
            });
            classification.record(&[StatementKind::Other], &[current.clone()]);
            continue;
        }

        let kinds = kinds_for_keyword(&first.value);
        if kinds.iter().any(|k| k.write_operation().is_some()) {
            let schemas = with_current(write_targets(statement), current.as_deref());
            classification.record(kinds, &schemas);
        } else {
            classification.record(kinds, &[qualified_schema(statement)]);
        }

        if is_keyword(first, &["WITH"]) {
            record_nested_writes(statement, current.as_deref(), &mut classification);
        }
    }
    classification
}

/// Data-modifying statements inside an unparseable `WITH` query. `FOR UPDATE`
/// locks and `ON DELETE` actions are not writes.
fn record_nested_writes(
    statement: &[&Token],
    current: Option<&str>,
    classification: &mut QueryClassification,
) {
    for (at, token) in statement.iter().enumerate().skip(1) {
        let Token::Word(word) = token else {
            continue;
        };
        if !is_keyword(word, &["INSERT", "UPDATE", "DELETE"]) {
            continue;
        }
        let clause_keyword = matches!(
            statement[at - 1],
            Token::Word(prev) if is_keyword(prev, &["FOR", "ON"])
        );
        if clause_keyword {
            continue;
        }
        let schemas = with_current(write_targets(&statement[at..]), current);
        classification.record(kinds_for_keyword(&word.value), &schemas);
    }
}

/// Schemas of the objects named after the first write anchor: `INTO a.t`,
/// `UPDATE a.t, b.u`, `TABLE IF NOT EXISTS a.t`. Unqualified names yield
/// `None`; a statement naming no object yields a single `None`.
fn write_targets(tokens: &[&Token]) -> Vec<Option<String>> {
    for (at, token) in tokens.iter().enumerate() {
        let Token::Word(anchor) = token else {
            continue;
        };
        if !is_keyword(anchor, WRITE_ANCHORS) {
            continue;
        }
        let mut next = at + 1;
        while matches!(tokens.get(next), Some(Token::Word(w)) if is_keyword(w, TARGET_MODIFIERS)) {
            next += 1;
        }
        let names = object_names(&tokens[next.min(tokens.len())..]);
        if !names.is_empty() {
            return names;
        }
    }
    vec![None]
}

/// Comma-separated object names at the start of `tokens`, each reduced to its
/// schema qualifier. An alias (`t AS x`, `t x`) may follow each name.
fn object_names(tokens: &[&Token]) -> Vec<Option<String>> {
    let mut schemas = Vec::new();
    let mut at = 0;
    loop {
        let Some(Token::Word(first)) = tokens.get(at) else {
            break;
        };
        let mut parts = vec![first.value.clone()];
        at += 1;
        while let (Some(Token::Period), Some(Token::Word(part))) =
            (tokens.get(at), tokens.get(at + 1))
        {
            parts.push(part.value.clone());
            at += 2;
        }
        schemas.push(parts.len().checked_sub(2).map(|i| parts[i].clone()));

        if matches!(tokens.get(at), Some(Token::Word(w)) if is_keyword(w, &["AS"])) {
            at += 1;
        }
        let alias = matches!(
            tokens.get(at),
            Some(Token::Word(w)) if w.quote_style.is_none() && w.keyword == Keyword::NoKeyword
        );
        if alias {
            at += 1;
        }
        if !matches!(tokens.get(at), Some(Token::Comma)) {
            break;
        }
        at += 1;
    }
    schemas
}

/// Find `<anchor> schema . table` in a token stream.
fn qualified_schema(tokens: &[&Token]) -> Option<String> {
    tokens.windows(4).find_map(|window| match window {
        [Token::Word(anchor), Token::Word(schema), Token::Period, Token::Word(_)]
            if is_keyword(anchor, TABLE_ANCHORS) =>
        {
            Some(schema.value.clone())
        }
        _ => None,
    })
}

/// Re-tokenize rendered SQL for statement shapes the visitor does not cover.
fn schema_from_text(sql: &str) -> Option<String> {
    let tokens = Tokenizer::new(&MySqlDialect {}, sql).tokenize().ok()?;
    qualified_schema(&significant(&tokens))
}

fn is_keyword(word: &Word, keywords: &[&str]) -> bool {
    word.quote_style.is_none()
        && keywords
            .iter()
            .any(|k| word.value.eq_ignore_ascii_case(k))
}
