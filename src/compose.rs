//! Email subjects and HTML bodies.

use crate::config::{NumberFormatting, ReportConfig};
use crate::error::Result;
use crate::model::{CategoryTotals, RenderedArtifact};
use crate::render::style::{display_values, format_grouped};
use crate::render::StylePlan;
use crate::schema::BoundSchema;
use polars::prelude::DataFrame;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone)]
pub struct Composer {
    report_title: String,
    signature: String,
    dashboard_link: Option<String>,
    schema: BoundSchema,
    numbers: NumberFormatting,
}

impl Composer {
    pub fn new(config: &ReportConfig, schema: &BoundSchema) -> Self {
        Self {
            report_title: config.report_title.clone(),
            signature: config.signature.clone(),
            dashboard_link: config.dashboard_link.clone().filter(|l| !l.trim().is_empty()),
            schema: schema.clone(),
            numbers: config.number_formatting(),
        }
    }

    pub fn salesperson(&self, artifact: &RenderedArtifact) -> Result<EmailContent> {
        let name = &artifact.recipient.name;
        let period = artifact.period.as_str();
        let summary = &artifact.summary;

        let mut body = String::from("<html><body>");
        let _ = write!(body, "<p>Hi {},</p>", escape_html(name));
        let _ = write!(
            body,
            "<p>Hope you are doing good. Attached is the {} for {}.</p>",
            escape_html(&self.report_title),
            escape_html(period)
        );

        if summary.categories.is_empty() {
            let _ = write!(
                body,
                "<p>This month you have {} action items corresponding to ${} of gross sales.</p>",
                summary.rows,
                money(summary.total_sales)
            );
        } else {
            let items = summary
                .categories
                .iter()
                .map(|c| {
                    format!(
                        "{} action items in '{}' corresponding to ${} of gross sales",
                        c.rows,
                        escape_html(&c.category),
                        money(c.sales)
                    )
                })
                .collect::<Vec<_>>()
                .join(" and you have ");
            let _ = write!(body, "<p>This month you have {}.</p>", items);
        }

        let (scope, opportunity) = match summary.categories.first() {
            Some(first) => (
                format!("items in {}", escape_html(&first.category.to_lowercase())),
                first.opportunity,
            ),
            None => ("these items".to_string(), summary.total_opportunity),
        };
        let _ = write!(
            body,
            "<p>Raising the {} to the recommended margin will result in ${} of commission profit gain.</p>",
            scope,
            money(opportunity)
        );

        if !summary.categories.is_empty() {
            body.push_str("<p>Summary by Category:</p>");
            body.push_str(&category_table(&summary.categories, &self.numbers));
        }
        self.push_footer(&mut body, "Thanks");

        Ok(EmailContent {
            subject: format!("{}: {} {}", name, self.report_title, period),
            html_body: body,
        })
    }

    pub fn manager(&self, artifact: &RenderedArtifact) -> Result<EmailContent> {
        let name = &artifact.recipient.name;
        let period = artifact.period.as_str();
        let summary = &artifact.summary;

        let mut body = String::from("<html><body>");
        let _ = write!(body, "<p>Hi {},</p>", escape_html(name));
        let _ = write!(
            body,
            "<p>Attached is your {} Manager Report. Key metrics for your team:</p>",
            escape_html(period)
        );
        let _ = write!(
            body,
            "<ul><li>Salespeople: {}</li><li>Action items: {}</li>\
             <li>Gross sales: ${}</li><li>Opportunity: ${}</li></ul>",
            summary.salespeople,
            summary.rows,
            money(summary.total_sales),
            money(summary.total_opportunity)
        );

        for pivot in &summary.pivots {
            let _ = write!(body, "<h3>{}</h3>", escape_html(&pivot.title));
            body.push_str(&html_table(&pivot.table, &self.schema, &self.numbers)?);
        }
        self.push_footer(&mut body, "Best regards");

        Ok(EmailContent {
            subject: format!("{}: Manager Report {}", name, period),
            html_body: body,
        })
    }

    fn push_footer(&self, body: &mut String, closing: &str) {
        if let Some(link) = &self.dashboard_link {
            let _ = write!(
                body,
                "<p>Access the live dashboard: <a href=\"{}\">{}</a></p>",
                escape_html(link),
                escape_html(&self.report_title)
            );
        }
        let _ = write!(
            body,
            "<p>{},<br>{}</p></body></html>",
            closing,
            escape_html(&self.signature)
        );
    }
}

fn money(value: f64) -> String {
    format_grouped(value, 0)
}

fn category_table(categories: &[CategoryTotals], numbers: &NumberFormatting) -> String {
    let mut html = String::from(
        "<table border=\"1\" cellpadding=\"4\"><thead><tr>\
         <th>Category</th><th># Items</th><th>Gross Sales</th><th>Opportunity</th>\
         </tr></thead><tbody>",
    );
    for c in categories {
        let _ = write!(
            html,
            "<tr><td>{}</td><td align=\"right\">{}</td><td align=\"right\">${}</td><td align=\"right\">${}</td></tr>",
            escape_html(&c.category),
            c.rows,
            format_grouped(c.sales, numbers.currency_decimals),
            format_grouped(c.opportunity, numbers.currency_decimals)
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// Render a frame as an HTML table using the same number presentation as
/// the workbook.
pub fn html_table(frame: &DataFrame, schema: &BoundSchema, numbers: &NumberFormatting) -> Result<String> {
    if frame.height() == 0 {
        return Ok("<p>No data available.</p>".to_string());
    }
    let plan = StylePlan::for_frame(frame, schema, numbers)?;
    let columns = plan
        .columns
        .iter()
        .map(|c| Ok((c, display_values(frame, &c.header, c.kind, numbers)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut html = String::from("<table border=\"1\" cellpadding=\"4\"><thead><tr>");
    for (style, _) in &columns {
        let _ = write!(html, "<th>{}</th>", escape_html(&style.header));
    }
    html.push_str("</tr></thead><tbody>");
    for row in 0..frame.height() {
        html.push_str("<tr>");
        for (style, values) in &columns {
            if style.is_numeric() {
                let _ = write!(html, "<td align=\"right\">{}</td>", escape_html(&values[row]));
            } else {
                let _ = write!(html, "<td>{}</td>", escape_html(&values[row]));
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    Ok(html)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
