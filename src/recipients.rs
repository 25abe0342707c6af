//! Recipient extraction.
//!
//! Salespeople come from the bound salesperson email/name pair, managers from
//! the configured manager tiers only. Within a role every email is listed once,
//! at the position it first appeared, carrying the last non-empty name seen
//! for it. The same address may appear in both roles.

use crate::data_utils::string_values;
use crate::error::Result;
use crate::model::{Recipient, Role};
use crate::schema::BoundSchema;
use polars::prelude::DataFrame;
use std::collections::HashMap;
use tracing::{debug, info};

pub fn extract_salespeople(
    table: &DataFrame,
    schema: &BoundSchema,
    limit: Option<usize>,
) -> Result<Vec<Recipient>> {
    let pairs = email_name_pairs(table, schema.salesperson_email(), schema.salesperson_name())?;
    Ok(collect_recipients(pairs, Role::SalesRep, limit))
}

pub fn extract_managers(
    table: &DataFrame,
    schema: &BoundSchema,
    limit: Option<usize>,
) -> Result<Vec<Recipient>> {
    let mut pairs = Vec::new();
    for tier in schema.manager_tiers() {
        pairs.extend(email_name_pairs(table, &tier.email, &tier.name)?);
    }
    Ok(collect_recipients(pairs, Role::Manager, limit))
}

fn email_name_pairs(
    table: &DataFrame,
    email_column: &str,
    name_column: &str,
) -> Result<Vec<(String, String)>> {
    let emails = string_values(table, email_column)?;
    let names = string_values(table, name_column)?;
    let mut skipped = 0usize;
    let pairs: Vec<(String, String)> = emails
        .into_iter()
        .zip(names)
        .filter_map(|pair| match pair {
            (Some(email), Some(name)) => Some((email, name)),
            (Some(_), None) => {
                skipped += 1;
                None
            }
            _ => None,
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, column = name_column, "Ignored rows with an email but no name");
    }
    Ok(pairs)
}

fn collect_recipients(
    pairs: Vec<(String, String)>,
    role: Role,
    limit: Option<usize>,
) -> Vec<Recipient> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut recipients: Vec<Recipient> = Vec::new();

    for (email, name) in pairs {
        match position.get(&email) {
            Some(&idx) => recipients[idx].name = name,
            None => {
                position.insert(email.clone(), recipients.len());
                recipients.push(Recipient { role, email, name });
            }
        }
    }

    if let Some(limit) = limit {
        recipients.truncate(limit);
    }
    recipients
}

/// Salespeople and managers for one run; read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RecipientDirectory {
    salespeople: Vec<Recipient>,
    managers: Vec<Recipient>,
}

impl RecipientDirectory {
    pub fn build(table: &DataFrame, schema: &BoundSchema, limit: Option<usize>) -> Result<Self> {
        let directory = Self {
            salespeople: extract_salespeople(table, schema, limit)?,
            managers: extract_managers(table, schema, limit)?,
        };
        info!(
            salespeople = directory.salespeople.len(),
            managers = directory.managers.len(),
            "Extracted recipients"
        );
        Ok(directory)
    }

    pub fn salespeople(&self) -> &[Recipient] {
        &self.salespeople
    }

    pub fn managers(&self) -> &[Recipient] {
        &self.managers
    }

    pub fn len(&self) -> usize {
        self.salespeople.len() + self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addresses listed in both roles; they receive two reports.
    pub fn dual_role_emails(&self) -> Vec<&str> {
        self.salespeople
            .iter()
            .filter(|s| self.managers.iter().any(|m| m.email == s.email))
            .map(|s| s.email.as_str())
            .collect()
    }
}
