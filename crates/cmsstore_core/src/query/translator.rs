//! Predicate → SQL rendering.

use super::{ColumnMap, CompareOp, Predicate, Query, QueryError, QueryField, QueryValue};
use crate::db::SqlBuilder;
use rusqlite::types::Value;

/// Renders queries over `F` against a base [`SqlBuilder`].
pub struct QueryTranslator<'m, F: QueryField> {
    columns: &'m ColumnMap<F>,
}

impl<'m, F: QueryField> QueryTranslator<'m, F> {
    pub fn new(columns: &'m ColumnMap<F>) -> Self {
        Self { columns }
    }

    /// Returns `base` with the query ANDed as one extra WHERE clause.
    ///
    /// An empty query leaves `base` untouched.
    pub fn translate(&self, base: SqlBuilder, query: &Query<F>) -> Result<SqlBuilder, QueryError> {
        match self.where_clause(query)? {
            Some((clause, params)) => Ok(base.where_clause(clause, params)),
            None => Ok(base),
        }
    }

    /// Renders the query alone; `None` when it has no clauses.
    pub fn where_clause(&self, query: &Query<F>) -> Result<Option<(String, Vec<Value>)>, QueryError> {
        if query.is_empty() {
            return Ok(None);
        }

        let mut params = Vec::new();
        let mut parts = Vec::with_capacity(query.clauses().len());
        for predicate in query.clauses() {
            let mut sql = String::new();
            self.render(predicate, &mut sql, &mut params)?;
            parts.push(sql);
        }

        let clause = if parts.len() == 1 {
            parts.remove(0)
        } else {
            parts
                .into_iter()
                .map(|part| format!("({part})"))
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        Ok(Some((clause, params)))
    }

    fn render(
        &self,
        predicate: &Predicate<F>,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<(), QueryError> {
        match predicate {
            Predicate::Compare { field, op, value } => {
                let column = self.columns.column(*field)?;
                if op.is_like() {
                    let text = value.as_text().ok_or_else(|| {
                        QueryError::InvalidPredicate(format!(
                            "pattern match on `{}` needs a text operand",
                            field.name()
                        ))
                    })?;
                    let escaped = escape_like(text);
                    let pattern = match op {
                        CompareOp::StartsWith => format!("{escaped}%"),
                        CompareOp::EndsWith => format!("%{escaped}"),
                        _ => format!("%{escaped}%"),
                    };
                    sql.push_str(&format!("{column} LIKE ? ESCAPE '\\'"));
                    params.push(Value::Text(pattern));
                } else {
                    sql.push_str(&format!("{column} {} ?", operator(*op)));
                    params.push(value.to_sql());
                }
            }
            Predicate::In { field, values } => {
                let column = self.columns.column(*field)?;
                if values.is_empty() {
                    sql.push_str("1 = 0");
                } else {
                    let placeholders = crate::db::sql::placeholders(values.len());
                    sql.push_str(&format!("{column} IN ({placeholders})"));
                    params.extend(values.iter().map(QueryValue::to_sql));
                }
            }
            Predicate::IsNull { field, negated } => {
                let column = self.columns.column(*field)?;
                if *negated {
                    sql.push_str(&format!("{column} IS NOT NULL"));
                } else {
                    sql.push_str(&format!("{column} IS NULL"));
                }
            }
            Predicate::And(left, right) => self.render_pair(left, "AND", right, sql, params)?,
            Predicate::Or(left, right) => self.render_pair(left, "OR", right, sql, params)?,
            Predicate::Not(inner) => {
                sql.push_str("NOT (");
                self.render(inner, sql, params)?;
                sql.push(')');
            }
        }
        Ok(())
    }

    fn render_pair(
        &self,
        left: &Predicate<F>,
        joiner: &str,
        right: &Predicate<F>,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<(), QueryError> {
        sql.push('(');
        self.render(left, sql, params)?;
        sql.push_str(&format!(" {joiner} "));
        self.render(right, sql, params)?;
        sql.push(')');
        Ok(())
    }
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::NotEq => "<>",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
        CompareOp::StartsWith | CompareOp::EndsWith | CompareOp::Contains => "LIKE",
    }
}

/// Escapes LIKE wildcards for use with `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_like, QueryTranslator};
    use crate::db::SqlBuilder;
    use crate::query::{ColumnMap, FieldExt, Query, QueryError, QueryField, QueryValue};
    use rusqlite::types::Value;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Field {
        Name,
        Trashed,
        Level,
    }

    impl QueryField for Field {
        const ALL: &'static [Self] = &[Self::Name, Self::Trashed, Self::Level];

        fn name(self) -> &'static str {
            match self {
                Self::Name => "name",
                Self::Trashed => "trashed",
                Self::Level => "level",
            }
        }
    }

    fn columns() -> ColumnMap<Field> {
        ColumnMap::new("thing")
            .map(Field::Name, "t.name")
            .map(Field::Trashed, "t.trashed")
            .map(Field::Level, "t.level")
    }

    #[test]
    fn clauses_are_anded_after_base_filters() {
        let columns = columns();
        let base = SqlBuilder::select(["t.id"])
            .from("things t")
            .where_clause("t.kind = ?", vec![Value::Text("doc".into())]);
        let query = Query::new()
            .filter(Field::Name.starts_with("Foo"))
            .filter(Field::Trashed.equals(false));

        let (sql, params) = QueryTranslator::new(&columns)
            .translate(base, &query)
            .unwrap()
            .build();

        assert_eq!(
            sql,
            "SELECT t.id FROM things t WHERE (t.kind = ?) AND \
             ((t.name LIKE ? ESCAPE '\\') AND (t.trashed = ?))"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("doc".into()),
                Value::Text("Foo%".into()),
                Value::Integer(0),
            ]
        );
    }

    #[test]
    fn or_and_not_nest_with_parentheses() {
        let columns = columns();
        let query = Query::new().filter(
            !(Field::Level.greater_than(2_i64).or(Field::Name.is_in(["a", "b"]))),
        );
        let (clause, params) = QueryTranslator::new(&columns)
            .where_clause(&query)
            .unwrap()
            .unwrap();
        assert_eq!(clause, "NOT ((t.level > ? OR t.name IN (?, ?)))");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn like_on_integer_operand_is_rejected() {
        let columns = columns();
        let query = Query::new().filter(crate::query::Predicate::Compare {
            field: Field::Level,
            op: crate::query::CompareOp::Contains,
            value: QueryValue::Integer(3),
        });
        let err = QueryTranslator::new(&columns)
            .where_clause(&query)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidPredicate(_)));
    }

    #[test]
    fn unmapped_field_fails_translation() {
        let columns = ColumnMap::new("thing").map(Field::Name, "t.name");
        let query = Query::new().filter(Field::Level.is_null());
        let err = QueryTranslator::new(&columns)
            .where_clause(&query)
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::UnmappedField {
                entity: "thing",
                field: "level",
            }
        );
    }

    #[test]
    fn escape_like_escapes_wildcards_and_backslash() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }
}
