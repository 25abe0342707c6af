use crate::data_utils::{filter_equals, filter_equals_any, sort_descending_by};
use crate::error::Result;
use crate::schema::BoundSchema;
use polars::prelude::*;

/// Rows whose salesperson email equals `email`. No match is an empty table
/// with the original headers, not an error.
pub fn subset_for_salesperson(
    table: &DataFrame,
    schema: &BoundSchema,
    email: &str,
) -> Result<DataFrame> {
    filter_equals(table, schema.salesperson_email(), email)
}

/// The whole table ordered descending by the ranking metric. Ties keep their
/// original order; nulls go last.
pub fn sort_for_managers(table: &DataFrame, metric: &str) -> Result<DataFrame> {
    sort_descending_by(table, metric)
}

/// Rows where any manager tier carries `email`, taken from the already ranked
/// table so the subset keeps the global order.
pub fn subset_for_manager(
    sorted: &DataFrame,
    schema: &BoundSchema,
    email: &str,
) -> Result<DataFrame> {
    let tiers: Vec<&str> = schema
        .manager_tiers()
        .iter()
        .map(|tier| tier.email.as_str())
        .collect();
    filter_equals_any(sorted, &tiers, email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_utils::{float_values, string_values};
    use crate::recipients::extract_managers;
    use crate::schema::ColumnMapping;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            category: None,
            ..ColumnMapping::default()
        }
    }

    fn table() -> DataFrame {
        df![
            "Row" => ["r1", "r2", "r3", "r4", "r5", "r6"],
            "Sales Rep Email" => ["a@x.com", "b@x.com", "a@x.com", "c@x.com", "b@x.com", "c@x.com"],
            "Sales Rep Name" => ["Ann", "Bob", "Ann", "Cy", "Bob", "Cy"],
            "Manager Email" => ["m@x.com", "n@x.com", "m@x.com", "m@x.com", "n@x.com", "o@x.com"],
            "Manager Name" => ["Max", "Nia", "Max", "Max", "Nia", "Oz"],
            "$ Gross Sales (TTM)" => [10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
            "$ Opp to Floor" => [5.0, 7.0, 5.0, 9.0, 1.0, 7.0]
        ]
        .unwrap()
    }

    fn rows(df: &DataFrame) -> Vec<String> {
        string_values(df, "Row")
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    #[test]
    fn test_subset_for_salesperson_exact_match() {
        let table = table();
        let schema = BoundSchema::bind(&table, &mapping()).unwrap();
        let subset = subset_for_salesperson(&table, &schema, "a@x.com").unwrap();
        assert_eq!(rows(&subset), vec!["r1", "r3"]);

        let none = subset_for_salesperson(&table, &schema, "A@X.COM").unwrap();
        assert_eq!(none.height(), 0);
        assert_eq!(none.width(), table.width());
    }

    #[test]
    fn test_sort_for_managers_is_stable() {
        let sorted = sort_for_managers(&table(), "$ Opp to Floor").unwrap();
        assert_eq!(rows(&sorted), vec!["r4", "r2", "r6", "r1", "r3", "r5"]);
        let metric = float_values(&sorted, "$ Opp to Floor").unwrap();
        assert!(metric.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_manager_subsets_reassemble_the_sorted_table() {
        let table = table();
        let schema = BoundSchema::bind(&table, &mapping()).unwrap();
        let sorted = sort_for_managers(&table, schema.ranking_metric()).unwrap();
        let managers = extract_managers(&sorted, &schema, None).unwrap();

        let mut reassembled: Vec<String> = Vec::new();
        for manager in &managers {
            let subset = subset_for_manager(&sorted, &schema, &manager.email).unwrap();
            let subset_rows = rows(&subset);
            // order inside a subset follows the global ranking
            let positions: Vec<usize> = subset_rows
                .iter()
                .map(|r| rows(&sorted).iter().position(|s| s == r).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            reassembled.extend(subset_rows);
        }

        let mut expected = rows(&sorted);
        expected.sort();
        reassembled.sort();
        assert_eq!(reassembled, expected);
    }

    #[test]
    fn test_padded_emails_still_match_their_recipient() {
        let table = df![
            "Row" => ["r1", "r2"],
            "Sales Rep Email" => ["a@x.com ", "b@x.com"],
            "Sales Rep Name" => ["Ann", "Bob"],
            "Manager Email" => ["m@x.com", " m@x.com"],
            "Manager Name" => ["Max", "Max"],
            "$ Gross Sales (TTM)" => [10.0, 20.0],
            "$ Opp to Floor" => [1.0, 2.0]
        ]
        .unwrap();
        let schema = BoundSchema::bind(&table, &mapping()).unwrap();

        assert_eq!(rows(&subset_for_salesperson(&table, &schema, "a@x.com").unwrap()), vec!["r1"]);
        let sorted = sort_for_managers(&table, schema.ranking_metric()).unwrap();
        let managers = extract_managers(&sorted, &schema, None).unwrap();
        assert_eq!(managers.len(), 1);
        let subset = subset_for_manager(&sorted, &schema, &managers[0].email).unwrap();
        assert_eq!(rows(&subset), vec!["r2", "r1"]);
    }

    #[test]
    fn test_manager_without_rows_gets_headers_only() {
        let table = table();
        let schema = BoundSchema::bind(&table, &mapping()).unwrap();
        let sorted = sort_for_managers(&table, schema.ranking_metric()).unwrap();
        let subset = subset_for_manager(&sorted, &schema, "ghost@x.com").unwrap();
        assert_eq!(subset.height(), 0);
        assert_eq!(subset.get_column_names(), table.get_column_names());
    }
}
