use std::fmt;

/// A recording rule to import and the table its samples are stored in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    name: String,
    target_table: String,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let target_table = table_name_for(&name);
        Self { name, target_table }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Longest identifier PostgreSQL keeps before truncating it.
pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Derives the table name of a query by replacing every `:` with `_`.
pub fn table_name_for(query: &str) -> String {
    query.replace(':', "_")
}
