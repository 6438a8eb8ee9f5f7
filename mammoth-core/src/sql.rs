//! SQL text helpers shared by the import executor and the export engine.

/// Quote a SQL identifier.
///
/// Identifiers that are already safe bare names (non-empty, not starting
/// with a digit, only `[a-z0-9_]`) are emitted verbatim; anything else is
/// wrapped in double-quotes with embedded double-quotes doubled.
pub fn quote_ident(name: &str) -> String {
    let bare = !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Schema-qualified, quoted table reference.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Comma-joined quoted column list.
pub fn quoted_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_bare() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("order_items_2"), "order_items_2");
    }

    #[test]
    fn test_quote_ident_quoted() {
        assert_eq!(quote_ident("Users"), "\"Users\"");
        assert_eq!(quote_ident("my table"), "\"my table\"");
        assert_eq!(quote_ident("2fast"), "\"2fast\"");
        assert_eq!(quote_ident(""), "\"\"");
    }

    #[test]
    fn test_quote_ident_embedded_quotes() {
        assert_eq!(quote_ident("my\"table"), "\"my\"\"table\"");
    }

    #[test]
    fn test_quote_ident_idempotent_output_is_valid() {
        // Quoting an already-quoted name still yields a syntactically valid identifier
        let once = quote_ident("My Table");
        let twice = quote_ident(&once);
        assert_eq!(twice, "\"\"\"My Table\"\"\"");
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table("public", "users"), "public.users");
        assert_eq!(
            qualified_table("App", "Order Items"),
            "\"App\".\"Order Items\""
        );
    }

    #[test]
    fn test_quoted_columns() {
        let cols = vec!["id".to_string(), "Full Name".to_string()];
        assert_eq!(quoted_columns(&cols), "id, \"Full Name\"");
    }
}
