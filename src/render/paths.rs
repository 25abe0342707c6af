use crate::model::{PeriodLabel, Recipient, Role};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

/// Make `raw` safe as one path component: runs of anything outside
/// `[A-Za-z0-9._-]` collapse to a single '_'.
pub fn sanitize_component(raw: &str) -> String {
    let replaced = UNSAFE_FILE_CHARS.replace_all(raw.trim(), "_");
    let trimmed = replaced.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out artifact paths for one run. A path is never handed out twice,
/// so no recipient can overwrite another recipient's workbook.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    output_dir: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl ArtifactPaths {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            claimed: HashSet::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn claim(&mut self, recipient: &Recipient, period: &PeriodLabel) -> PathBuf {
        let name = sanitize_component(&recipient.name);
        let period = sanitize_component(period.as_str());
        let stem = match recipient.role {
            Role::SalesRep => format!("{}_{}", name, period),
            Role::Manager => format!("{}_Manager_Report_{}", name, period),
        };

        let mut candidate = self.output_dir.join(format!("{}.xlsx", stem));
        let mut n = 2;
        while self.claimed.contains(&candidate) {
            candidate = self.output_dir.join(format!("{}_{}.xlsx", stem, n));
            n += 1;
        }
        self.claimed.insert(candidate.clone());
        candidate
    }
}
