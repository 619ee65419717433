//! Load-time SQL lint for control definitions.
//!
//! Uses sqlparser-rs with PostgreSQL dialect to verify that control SQL is a
//! single read statement with no data-modifying construct hiding in a CTE,
//! set operation, derived table, or join.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::error::{Result, VitalsError};

/// Verifies that `sql` parses as exactly one read-only query statement.
///
/// Runs at catalog load time, so a control with unsafe SQL is rejected before
/// it can ever be routed to. The executor's keyword gate is the cheap runtime
/// backstop; this lint is the thorough author-time check.
pub fn ensure_single_select(sql: &str) -> Result<()> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| VitalsError::validation(format!("SQL parse error: {e}")))?;

    match statements.as_slice() {
        [] => Err(VitalsError::validation("empty SQL statement")),
        [Statement::Query(query)] => match check_query(query) {
            None => Ok(()),
            Some(found) => Err(VitalsError::validation(format!(
                "read-only violation: {found}"
            ))),
        },
        [other] => Err(VitalsError::validation(format!(
            "control SQL must be a single SELECT statement, found {}",
            statement_kind(other)
        ))),
        _ => Err(VitalsError::validation(format!(
            "control SQL must be a single statement, found {}",
            statements.len()
        ))),
    }
}

/// Returns a display name for a statement, for error messages.
fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(_) => "SELECT",
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => "ALTER",
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => "CREATE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        Statement::StartTransaction { .. } => "BEGIN",
        Statement::Explain { .. } => "EXPLAIN",
        _ => "an unsupported statement",
    }
}

/// Walks a query for data-modifying constructs: CTEs first, then the body.
/// Returns a description of the first offense found.
fn check_query(query: &Query) -> Option<String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(found) = check_query(&cte.query) {
                return Some(found);
            }
        }
    }

    check_set_expr(&query.body)
}

fn offense(statement: &Statement) -> String {
    format!("{} statement inside query body", statement_kind(statement))
}

fn check_set_expr(set_expr: &SetExpr) -> Option<String> {
    match set_expr {
        // Data-modifying statements inside CTE bodies (wrapped as Statement)
        SetExpr::Delete(stmt) => Some(offense(stmt)),
        SetExpr::Update(stmt) => Some(offense(stmt)),
        SetExpr::Insert(stmt) => Some(offense(stmt)),
        SetExpr::Merge(stmt) => Some(offense(stmt)),

        // Nested query - recurse
        SetExpr::Query(query) => check_query(query),

        // SELECT - check FROM clause for subqueries
        SetExpr::Select(select) => check_select(select),

        // Set operations (UNION, INTERSECT, EXCEPT) - check both sides
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left).or_else(|| check_set_expr(right))
        }

        // Values, Table - no nested queries possible
        SetExpr::Values(_) | SetExpr::Table(_) => None,
    }
}

/// Checks a Select's FROM clause for subqueries.
fn check_select(select: &Select) -> Option<String> {
    select.from.iter().find_map(check_table_with_joins)
}

/// Checks the main relation and all joins of a FROM entry.
fn check_table_with_joins(twj: &TableWithJoins) -> Option<String> {
    if let Some(found) = check_table_factor(&twj.relation) {
        return Some(found);
    }

    twj.joins
        .iter()
        .find_map(|join| check_table_factor(&join.relation))
}

/// Checks a TableFactor, recursing into derived tables (subqueries).
fn check_table_factor(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => check_table_with_joins(table_with_joins),
        // Other variants (Table, TableFunction, etc.) carry no nested query
        _ => None,
    }
}
