//! Parameterized SQL composition.
//!
//! Every clause carries its own positional (`?`) parameters; `build()`
//! concatenates clauses and parameters in statement order so placeholders
//! and values never drift apart.

use rusqlite::types::Value;

/// Small SELECT builder used for base queries and translated filters.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    select: Vec<String>,
    from: String,
    joins: Vec<(String, Vec<Value>)>,
    wheres: Vec<(String, Vec<Value>)>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<(i64, i64)>,
}

impl SqlBuilder {
    pub fn select<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = table.into();
        self
    }

    pub fn inner_join(mut self, table: &str, on: &str) -> Self {
        self.joins
            .push((format!("INNER JOIN {table} ON {on}"), Vec::new()));
        self
    }

    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push((format!("LEFT JOIN {table} ON {on}"), Vec::new()));
        self
    }

    /// Adds one WHERE clause; clauses are ANDed in insertion order.
    pub fn where_clause(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.push_where(clause, params);
        self
    }

    /// In-place variant of [`SqlBuilder::where_clause`].
    pub fn push_where(&mut self, clause: impl Into<String>, params: Vec<Value>) {
        self.wheres.push((clause.into(), params));
    }

    /// Adds `column IN (?, ?, ...)`; an empty list matches nothing.
    pub fn where_in(self, column: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return self.where_clause("1 = 0", Vec::new());
        }
        let placeholders = placeholders(values.len());
        self.where_clause(format!("{column} IN ({placeholders})"), values)
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn order_by(mut self, expression: impl Into<String>) -> Self {
        self.order_by.push(expression.into());
        self
    }

    pub fn clear_order_by(mut self) -> Self {
        self.order_by.clear();
        self
    }

    pub fn limit(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some((limit, offset));
        self
    }

    /// Replaces the projection while keeping joins and filters.
    pub fn with_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Renders SQL text and its ordered parameter list.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM {}", self.select.join(", "), self.from);
        let mut params = Vec::new();

        for (join, join_params) in &self.joins {
            sql.push(' ');
            sql.push_str(join);
            params.extend(join_params.iter().cloned());
        }

        if !self.wheres.is_empty() {
            let clauses = self
                .wheres
                .iter()
                .map(|(clause, _)| format!("({clause})"))
                .collect::<Vec<_>>();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            for (_, where_params) in &self.wheres {
                params.extend(where_params.iter().cloned());
            }
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some((limit, offset)) = self.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(limit));
            params.push(Value::Integer(offset));
        }

        (sql, params)
    }
}

/// `?, ?, ?` for `count` parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::SqlBuilder;
    use rusqlite::types::Value;

    #[test]
    fn build_orders_parameters_by_clause_position() {
        let (sql, params) = SqlBuilder::select(["n.id"])
            .from("nodes n")
            .inner_join("content c", "c.node_id = n.id")
            .where_clause("n.object_type = ?", vec![Value::Text("doc".into())])
            .where_in("n.id", vec![Value::Integer(1), Value::Integer(2)])
            .order_by("n.id")
            .limit(10, 20)
            .build();

        assert_eq!(
            sql,
            "SELECT n.id FROM nodes n INNER JOIN content c ON c.node_id = n.id \
             WHERE (n.object_type = ?) AND (n.id IN (?, ?)) ORDER BY n.id LIMIT ? OFFSET ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("doc".into()),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(10),
                Value::Integer(20),
            ]
        );
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let (sql, params) = SqlBuilder::select(["id"])
            .from("nodes")
            .where_in("id", Vec::new())
            .build();
        assert!(sql.ends_with("WHERE (1 = 0)"));
        assert!(params.is_empty());
    }
}
