//! CSV source discovery and loading.
//!
//! Each source is located in the input directory by trying a list of known
//! export filenames (matched case-insensitively). A missing source is not an
//! error: the analysis proceeds with whatever subset is present and the
//! report notes which sources contributed. A row that fails CSV parsing is
//! skipped with a warning; it never aborts the batch.

use crate::error::{Result, Sift365Error};
use crate::records::{
    AppRegistrationRecord, AuditRecord, CaPolicyRecord, DelegationRecord, InboxRuleRecord,
    MailTraceRecord, RawRow, SignInRecord,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SIGN_IN_FILES: &[&str] = &["signin_log.csv", "sign_in_log.csv", "signins.csv"];
const AUDIT_FILES: &[&str] = &["audit_log.csv", "admin_audit_log.csv", "auditlog.csv"];
const INBOX_RULE_FILES: &[&str] = &["inbox_rules.csv", "inboxrules.csv", "mailbox_rules.csv"];
const DELEGATION_FILES: &[&str] = &["delegations.csv", "mailbox_permissions.csv", "mailbox_delegations.csv"];
const APP_REG_FILES: &[&str] = &["app_registrations.csv", "applications.csv", "appregistrations.csv"];
const CA_POLICY_FILES: &[&str] = &["ca_policies.csv", "conditional_access.csv", "conditional_access_policies.csv"];
const MAIL_TRACE_FILES: &[&str] = &["mail_trace.csv", "message_trace.csv", "messagetrace.csv", "etr.csv"];

/// Everything found in the input directory. `None` means the source's file
/// was absent; an empty `Vec` means the file existed but held no usable rows.
#[derive(Debug, Default)]
pub struct LoadedSources {
    pub sign_ins: Option<Vec<SignInRecord>>,
    pub audit: Option<Vec<AuditRecord>>,
    pub inbox_rules: Option<Vec<InboxRuleRecord>>,
    pub delegations: Option<Vec<DelegationRecord>>,
    pub app_registrations: Option<Vec<AppRegistrationRecord>>,
    pub ca_policies: Option<Vec<CaPolicyRecord>>,
    pub mail_trace: Option<Vec<MailTraceRecord>>,
}

impl LoadedSources {
    /// Names of the sources that were present, for the report footer.
    pub fn contributing_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.sign_ins.is_some() {
            sources.push("Sign-in log");
        }
        if self.audit.is_some() {
            sources.push("Admin audit log");
        }
        if self.inbox_rules.is_some() {
            sources.push("Inbox rules");
        }
        if self.delegations.is_some() {
            sources.push("Mailbox delegations");
        }
        if self.app_registrations.is_some() {
            sources.push("App registrations");
        }
        if self.ca_policies.is_some() {
            sources.push("Conditional Access policies");
        }
        if self.mail_trace.is_some() {
            sources.push("Mail trace");
        }
        sources
    }

    pub fn any_present(&self) -> bool {
        !self.contributing_sources().is_empty()
    }
}

/// Finds the first directory entry matching any candidate name,
/// case-insensitively.
fn find_source_file(dir: &Path, candidates: &[&str]) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let names: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();

    for candidate in candidates {
        for path in &names {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.eq_ignore_ascii_case(candidate))
                .unwrap_or(false);
            if matches {
                return Some(path.clone());
            }
        }
    }
    None
}

/// Reads one CSV file into typed records. Rows that fail to parse or are
/// entirely empty are skipped, never fatal.
fn load_csv<T, F>(path: &Path, parse: F) -> Result<Vec<T>>
where
    F: Fn(&RawRow) -> T,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(values) => {
                let row = RawRow::new(&headers, &values);
                if row.is_empty() {
                    skipped += 1;
                    continue;
                }
                records.push(parse(&row));
            }
            Err(e) => {
                warn!(
                    file = %path.display(),
                    row = line + 2,
                    error = %e,
                    "skipping unparseable row"
                );
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        debug!(file = %path.display(), skipped, "rows skipped during load");
    }
    Ok(records)
}

fn load_source<T, F>(dir: &Path, candidates: &[&str], label: &str, parse: F) -> Option<Vec<T>>
where
    F: Fn(&RawRow) -> T,
{
    let path = match find_source_file(dir, candidates) {
        Some(p) => p,
        None => {
            info!("{} not found, skipping source", label);
            return None;
        }
    };

    match load_csv(&path, parse) {
        Ok(records) => {
            info!(
                file = %path.display(),
                count = records.len(),
                "loaded {}",
                label
            );
            Some(records)
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to read {}, skipping source", label);
            None
        }
    }
}

/// Loads every source found in the directory. Errors only when the directory
/// itself is unusable; individual sources are optional.
pub fn load_sources(dir: &Path) -> Result<LoadedSources> {
    if !dir.is_dir() {
        return Err(Sift365Error::InputError(format!(
            "Input directory not found: {}",
            dir.display()
        )));
    }

    Ok(LoadedSources {
        sign_ins: load_source(dir, SIGN_IN_FILES, "sign-in log", SignInRecord::from_row),
        audit: load_source(dir, AUDIT_FILES, "admin audit log", AuditRecord::from_row),
        inbox_rules: load_source(dir, INBOX_RULE_FILES, "inbox rules", InboxRuleRecord::from_row),
        delegations: load_source(
            dir,
            DELEGATION_FILES,
            "mailbox delegations",
            DelegationRecord::from_row,
        ),
        app_registrations: load_source(
            dir,
            APP_REG_FILES,
            "app registrations",
            AppRegistrationRecord::from_row,
        ),
        ca_policies: load_source(
            dir,
            CA_POLICY_FILES,
            "conditional access policies",
            CaPolicyRecord::from_row,
        ),
        mail_trace: load_source(dir, MAIL_TRACE_FILES, "mail trace", MailTraceRecord::from_row),
    })
}

/// Loads only the mail-trace source, for the standalone spam analysis
/// command. The file may be given directly or discovered in a directory.
pub fn load_mail_trace(path: &Path) -> Result<Vec<MailTraceRecord>> {
    let file = if path.is_dir() {
        find_source_file(path, MAIL_TRACE_FILES).ok_or_else(|| {
            Sift365Error::InputError(format!(
                "No mail-trace export found in {}",
                path.display()
            ))
        })?
    } else if path.is_file() {
        path.to_path_buf()
    } else {
        return Err(Sift365Error::InputError(format!(
            "Mail-trace input not found: {}",
            path.display()
        )));
    };

    load_csv(&file, MailTraceRecord::from_row)
}
