use calamine::{open_workbook_auto, Data, Reader};
use pricing_reports::config::ReportConfig;
use pricing_reports::error::{ReportError, Result};
use pricing_reports::mailer::{Mailer, OutgoingEmail};
use pricing_reports::model::{PeriodLabel, Role};
use pricing_reports::pipeline::{run_for_period, OutcomeStatus};
use pricing_reports::schema::ColumnMapping;
use rust_xlsxwriter::Workbook;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

const HEADERS: &[&str] = &[
    "Sales Rep Email",
    "Sales Rep Name",
    "Manager Email",
    "Manager Name",
    "Item",
    "$ Gross Sales (TTM)",
    "$ Opp to Floor",
    "Category",
];

/// Records every message; fails for the addresses in `fail_for`.
#[derive(Default)]
struct RecordingMailer {
    sent: RefCell<Vec<OutgoingEmail>>,
    fail_for: Vec<String>,
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if self.fail_for.contains(&email.to) {
            return Err(ReportError::Dispatch(format!("relay rejected {}", email.to)));
        }
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

fn write_input(path: &Path, headers: &[&str], rows: &[Vec<&str>]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            let (row_idx, col_idx) = (r as u32 + 1, col as u16);
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(n) => sheet.write_number(row_idx, col_idx, n).unwrap(),
                Err(_) => sheet.write_string(row_idx, col_idx, *value).unwrap(),
            };
        }
    }
    workbook.save(path).unwrap();
}

fn config(dir: &Path, input: PathBuf) -> ReportConfig {
    ReportConfig {
        input_path: input,
        output_dir: dir.join("reports"),
        log_dir: None,
        sender: Some("pricing@example.com".to_string()),
        columns: ColumnMapping {
            category: None,
            ..ColumnMapping::default()
        },
        ..ReportConfig::default()
    }
}

fn three_row_input(dir: &Path) -> PathBuf {
    let path = dir.join("Sales_Report_Temp.xlsx");
    write_input(
        &path,
        HEADERS,
        &[
            vec!["a@example.com", "Rep A", "m@example.com", "Manager M", "row1", "100", "10", "Basement"],
            vec!["b@example.com", "Rep B", "m@example.com", "Manager M", "row2", "200", "20", "Basement"],
            vec!["", "Rep A", "m@example.com", "Manager M", "row3", "50", "5", "Attic"],
        ],
    );
    path
}

fn period() -> PeriodLabel {
    PeriodLabel::new("Jun, 2025")
}

/// Values of `column` in `sheet`, as text, one per data row.
fn sheet_column(path: &Path, sheet: &str, column: &str) -> Vec<String> {
    let mut workbook = open_workbook_auto(path).unwrap();
    let range = workbook.worksheet_range(sheet).unwrap();
    let mut rows = range.rows();
    let header = rows.next().unwrap();
    let idx = header
        .iter()
        .position(|c| matches!(c, Data::String(s) if s == column))
        .unwrap_or_else(|| panic!("column {} not in sheet {}", column, sheet));
    rows.map(|row| match &row[idx] {
        Data::String(s) => s.clone(),
        Data::Float(n) => n.to_string(),
        Data::Int(n) => n.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    })
    .collect()
}

fn sheet_names(path: &Path) -> Vec<String> {
    open_workbook_auto(path).unwrap().sheet_names().to_vec()
}

#[test]
fn test_three_row_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let input = three_row_input(dir.path());
    let config = config(dir.path(), input);
    let mailer = RecordingMailer::default();

    let summary = run_for_period(&config, &mailer, period()).unwrap();

    assert_eq!(summary.rows_loaded, 3);
    assert_eq!(summary.rows_dropped, 1);
    assert_eq!(summary.salespeople, 2);
    assert_eq!(summary.managers, 1);
    assert!(summary.is_clean());

    let reps: Vec<&str> = summary
        .outcomes_for(Role::SalesRep)
        .map(|o| o.recipient.email.as_str())
        .collect();
    assert_eq!(reps, vec!["a@example.com", "b@example.com"]);

    let rep_a = dir.path().join("reports/Rep_A_Jun_2025.xlsx");
    assert_eq!(sheet_names(&rep_a), vec!["Detail"]);
    assert_eq!(sheet_column(&rep_a, "Detail", "Item"), vec!["row1"]);
    assert_eq!(sheet_column(&rep_a, "Detail", "$ Gross Sales (TTM)"), vec!["100"]);

    let manager = dir.path().join("reports/Manager_M_Manager_Report_Jun_2025.xlsx");
    assert_eq!(sheet_names(&manager), vec!["Summary", "All Data"]);
    assert_eq!(sheet_column(&manager, "All Data", "Item"), vec!["row2", "row1"]);
    assert_eq!(
        sheet_column(&manager, "Summary", "Sales Rep Name"),
        vec!["Rep A", "Rep B"]
    );

    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].to, "a@example.com");
    assert_eq!(sent[0].subject, "Rep A: Attic and Basement Report Jun, 2025");
    assert_eq!(sent[0].attachment, rep_a);
    assert_eq!(sent[2].to, "m@example.com");
    assert_eq!(sent[2].subject, "Manager M: Manager Report Jun, 2025");
}

#[test]
fn test_headers_only_input_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.xlsx");
    write_input(&input, HEADERS, &[]);
    let config = config(dir.path(), input);
    let mailer = RecordingMailer::default();

    let summary = run_for_period(&config, &mailer, period()).unwrap();

    assert_eq!(summary.rows_loaded, 0);
    assert!(summary.outcomes.is_empty());
    assert!(summary.artifacts().is_empty());
    assert!(mailer.sent.borrow().is_empty());
}

#[test]
fn test_missing_column_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("renamed.xlsx");
    let mut headers = HEADERS.to_vec();
    headers[6] = "Opportunity";
    write_input(
        &input,
        &headers,
        &[vec!["a@example.com", "Rep A", "m@example.com", "Manager M", "row1", "100", "10", "Basement"]],
    );
    let config = config(dir.path(), input);
    let mailer = RecordingMailer::default();

    let err = run_for_period(&config, &mailer, period()).unwrap_err();
    assert!(matches!(err, ReportError::SchemaMismatch(_)));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("$ Opp to Floor"));
    assert!(mailer.sent.borrow().is_empty());
    assert!(!dir.path().join("reports").exists());
}

#[test]
fn test_missing_input_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), dir.path().join("nope.xlsx"));
    let err = run_for_period(&config, &RecordingMailer::default(), period()).unwrap_err();
    assert!(matches!(err, ReportError::Load(_)));
}

#[test]
fn test_dispatch_failure_does_not_stop_other_recipients() {
    let dir = tempfile::tempdir().unwrap();
    let input = three_row_input(dir.path());
    let config = config(dir.path(), input);
    let mailer = RecordingMailer {
        fail_for: vec!["a@example.com".to_string()],
        ..RecordingMailer::default()
    };

    let summary = run_for_period(&config, &mailer, period()).unwrap();

    assert_eq!(summary.dispatch_failures(), 1);
    assert_eq!(summary.delivered(), 2);
    let failed = &summary.outcomes[0];
    assert_eq!(failed.recipient.email, "a@example.com");
    match &failed.status {
        OutcomeStatus::DispatchFailed { path, error } => {
            assert!(path.exists());
            assert!(error.contains("relay rejected"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(summary.artifacts().len(), 3);
}

#[test]
fn test_test_mode_redirects_every_email() {
    let dir = tempfile::tempdir().unwrap();
    let input = three_row_input(dir.path());
    let config = ReportConfig {
        test_mode: true,
        test_recipient: Some("qa@example.com".to_string()),
        ..config(dir.path(), input)
    };
    let mailer = RecordingMailer::default();

    run_for_period(&config, &mailer, period()).unwrap();

    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|e| e.to == "qa@example.com"));
}

#[test]
fn test_recipient_limit_applies_per_role() {
    let dir = tempfile::tempdir().unwrap();
    let input = three_row_input(dir.path());
    let config = ReportConfig {
        recipient_limit: Some(1),
        ..config(dir.path(), input)
    };
    let mailer = RecordingMailer::default();

    let summary = run_for_period(&config, &mailer, period()).unwrap();
    assert_eq!(summary.salespeople, 1);
    assert_eq!(summary.managers, 1);
    assert_eq!(mailer.sent.borrow().len(), 2);
}

#[test]
fn test_category_sheets_with_default_layout() {
    let dir = tempfile::tempdir().unwrap();
    let input = three_row_input(dir.path());
    let config = ReportConfig {
        columns: ColumnMapping::default(),
        ..config(dir.path(), input)
    };
    let mailer = RecordingMailer::default();

    run_for_period(&config, &mailer, period()).unwrap();

    let rep_b = dir.path().join("reports/Rep_B_Jun_2025.xlsx");
    assert_eq!(sheet_names(&rep_b), vec!["Basement", "Attic"]);
    assert_eq!(sheet_column(&rep_b, "Basement", "Item"), vec!["row2"]);
    assert!(sheet_column(&rep_b, "Attic", "Item").is_empty());

    let manager = dir.path().join("reports/Manager_M_Manager_Report_Jun_2025.xlsx");
    assert_eq!(
        sheet_names(&manager),
        vec!["Basement Summary", "Attic Summary", "All Data"]
    );

    let body = &mailer.sent.borrow()[0].html_body;
    assert!(body.contains("1 action items in 'Basement' corresponding to $100 of gross sales"));
    assert!(body.contains("$10 of commission profit gain"));
}

#[test]
fn test_padded_csv_emails_reach_their_recipients() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sales.csv");
    std::fs::write(
        &input,
        format!(
            "{}\n{}\n{}\n",
            HEADERS.join(","),
            "\"a@example.com \",Rep A,m@example.com,Manager M,row1,100,10,Basement",
            "b@example.com,Rep B,\" m@example.com\",Manager M,row2,200,20,Basement",
        ),
    )
    .unwrap();
    let config = config(dir.path(), input);
    let mailer = RecordingMailer::default();

    let summary = run_for_period(&config, &mailer, period()).unwrap();

    let rows: Vec<(&str, usize)> = summary
        .outcomes
        .iter()
        .map(|o| (o.recipient.email.as_str(), o.rows))
        .collect();
    assert_eq!(
        rows,
        vec![("a@example.com", 1), ("b@example.com", 1), ("m@example.com", 2)]
    );

    let manager = dir.path().join("reports/Manager_M_Manager_Report_Jun_2025.xlsx");
    assert_eq!(sheet_column(&manager, "All Data", "Item"), vec!["row2", "row1"]);
}
