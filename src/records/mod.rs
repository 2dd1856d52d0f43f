//! Record normalization.
//!
//! Each analyzed source arrives as a CSV export with its own header quirks
//! (exports from different admin portals disagree on spacing, hyphenation and
//! casing). Everything is funnelled through [`RawRow`] into one strictly
//! typed record per source with every field always present: absent or
//! NULL-ish values become empty strings and boolean-ish text becomes a real
//! bool with a `false` default. No row is ever rejected here — a partially
//! filled record is still usable evidence.

use std::collections::HashMap;

/// NULL-ish markers some exporters emit for missing cells.
const NULL_MARKERS: [&str; 4] = ["null", "nan", "n/a", "-"];

/// A single CSV row with normalized header lookup.
///
/// Header names are matched case-insensitively and ignoring spaces, hyphens
/// and underscores, so "Sender Address", "sender_address" and "SenderAddress"
/// all resolve to the same column.
#[derive(Debug, Clone)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

/// Collapses a header name to its canonical lookup key.
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Coerces a raw cell value: trims, and maps NULL-ish markers to empty.
fn normalize_value(value: &str) -> String {
    let trimmed = value.trim();
    if NULL_MARKERS
        .iter()
        .any(|m| trimmed.eq_ignore_ascii_case(m))
    {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// "True"-like text becomes `true`; anything unrecognized is `false`.
pub fn coerce_bool(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v == "1"
}

impl RawRow {
    pub fn new(headers: &[String], values: &csv::StringRecord) -> Self {
        let mut fields = HashMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let value = values.get(i).unwrap_or("");
            fields.insert(normalize_header(header), normalize_value(value));
        }
        Self { fields }
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut fields = HashMap::new();
        for (k, v) in pairs {
            fields.insert(normalize_header(k), normalize_value(v));
        }
        Self { fields }
    }

    /// Returns the first non-empty value among the given column aliases.
    pub fn get(&self, aliases: &[&str]) -> String {
        for alias in aliases {
            if let Some(value) = self.fields.get(&normalize_header(alias)) {
                if !value.is_empty() {
                    return value.clone();
                }
            }
        }
        String::new()
    }

    pub fn get_bool(&self, aliases: &[&str]) -> bool {
        coerce_bool(&self.get(aliases))
    }

    /// True when every cell in the row is empty after normalization.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.is_empty())
    }
}

/// One entry from the Entra ID sign-in log export.
#[derive(Debug, Clone, Default)]
pub struct SignInRecord {
    pub user_principal_name: String,
    pub ip_address: String,
    pub country: String,
    pub risk_level: String,
    pub status: String,
    pub app_display_name: String,
    pub created_date_time: String,
}

impl SignInRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            user_principal_name: row.get(&["userPrincipalName", "upn", "user"]),
            ip_address: row.get(&["ipAddress", "ip", "clientIp"]),
            country: row.get(&["country", "location", "countryOrRegion"]),
            risk_level: row.get(&["riskLevel", "riskLevelDuringSignIn", "risk"]),
            status: row.get(&["status", "signInStatus", "errorCode", "result"]),
            app_display_name: row.get(&["appDisplayName", "application", "app"]),
            created_date_time: row.get(&["createdDateTime", "date", "timestamp", "signInTime"]),
        }
    }

    /// A sign-in counts as successful when the status says so or the error
    /// code is 0. Anything else (including blank) is treated as failed.
    pub fn succeeded(&self) -> bool {
        let status = self.status.trim();
        status.eq_ignore_ascii_case("success") || status == "0"
    }
}

/// One entry from the unified admin audit log export.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    pub activity: String,
    pub initiated_by: String,
    pub target: String,
    pub activity_date_time: String,
}

impl AuditRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            activity: row.get(&["activityDisplayName", "activity", "operation"]),
            initiated_by: row.get(&["initiatedBy", "actor", "userPrincipalName", "user"]),
            target: row.get(&["targetResources", "target", "objectId"]),
            activity_date_time: row.get(&["activityDateTime", "date", "timestamp"]),
        }
    }
}

/// One mailbox inbox rule from the Exchange rules dump.
#[derive(Debug, Clone, Default)]
pub struct InboxRuleRecord {
    pub mailbox_owner: String,
    pub rule_name: String,
    pub forward_to: String,
    pub redirect_to: String,
    pub move_to_folder: String,
    pub delete_message: bool,
    pub enabled: bool,
}

impl InboxRuleRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            mailbox_owner: row.get(&["mailboxOwnerUpn", "mailbox", "owner", "userPrincipalName"]),
            rule_name: row.get(&["ruleName", "name", "displayName"]),
            forward_to: row.get(&["forwardTo", "forwardAsAttachmentTo"]),
            redirect_to: row.get(&["redirectTo"]),
            move_to_folder: row.get(&["moveToFolder", "targetFolder"]),
            delete_message: row.get_bool(&["deleteMessage", "delete"]),
            enabled: row.get_bool(&["enabled", "isEnabled"]),
        }
    }
}

/// One mailbox delegation entry (permissions dump).
#[derive(Debug, Clone, Default)]
pub struct DelegationRecord {
    pub mailbox: String,
    pub delegate: String,
    pub access_rights: String,
}

impl DelegationRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            mailbox: row.get(&["mailbox", "identity", "userPrincipalName"]),
            delegate: row.get(&["delegate", "user", "trustee", "grantedTo"]),
            access_rights: row.get(&["accessRights", "rights", "permission"]),
        }
    }

    /// The domain part of the delegate address, lowercased.
    pub fn delegate_domain(&self) -> String {
        self.delegate
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_lowercase())
            .unwrap_or_default()
    }
}

/// One application registration from the directory export.
#[derive(Debug, Clone, Default)]
pub struct AppRegistrationRecord {
    pub display_name: String,
    pub app_id: String,
    pub required_permission_ids: Vec<String>,
    pub homepage: String,
    pub publisher_domain: String,
    pub created_date_time: String,
}

impl AppRegistrationRecord {
    pub fn from_row(row: &RawRow) -> Self {
        let raw_permissions = row.get(&[
            "requiredResourceAccess",
            "requiredPermissionIds",
            "permissions",
        ]);
        let required_permission_ids = raw_permissions
            .split([';', ',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            display_name: row.get(&["displayName", "appName", "name"]),
            app_id: row.get(&["appId", "applicationId", "clientId"]),
            required_permission_ids,
            homepage: row.get(&["homepage", "homePageUrl", "web"]),
            publisher_domain: row.get(&["publisherDomain", "publisher"]),
            created_date_time: row.get(&["createdDateTime", "date"]),
        }
    }
}

/// One Conditional Access policy from the policy dump.
#[derive(Debug, Clone, Default)]
pub struct CaPolicyRecord {
    pub display_name: String,
    pub state: String,
    pub modified_date_time: String,
    pub excluded_roles: String,
}

impl CaPolicyRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            display_name: row.get(&["displayName", "policyName", "name"]),
            state: row.get(&["state", "status"]),
            modified_date_time: row.get(&["modifiedDateTime", "lastModified", "modified"]),
            excluded_roles: row.get(&["excludedRoles", "excludeRoles", "roleExclusions"]),
        }
    }
}

/// One message from the Exchange mail-trace (ETR) export.
///
/// Mail-trace exports are the least consistent of the inputs; the alias lists
/// here cover the header variants seen across message-trace and extended
/// message-trace downloads.
#[derive(Debug, Clone, Default)]
pub struct MailTraceRecord {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub direction: String,
    pub status: String,
    pub from_ip: String,
    pub to_ip: String,
    pub message_id: String,
    pub received: String,
}

impl MailTraceRecord {
    pub fn from_row(row: &RawRow) -> Self {
        Self {
            sender: row.get(&["senderAddress", "sender", "from", "fromAddress", "p1Sender"]),
            recipient: row.get(&["recipientAddress", "recipient", "recipients", "to", "toAddress"]),
            subject: row.get(&["subject", "messageSubject"]),
            direction: row.get(&["direction", "mailDirection", "messageDirection"]),
            status: row.get(&["status", "deliveryStatus", "event", "eventId"]),
            from_ip: row.get(&["fromIp", "senderIp", "originatingIp", "sourceIp", "clientIp"]),
            to_ip: row.get(&["toIp", "destinationIp", "serverIp"]),
            message_id: row.get(&["messageId", "messageTraceId", "networkMessageId"]),
            received: row.get(&["received", "dateReceived", "timestamp", "date"]),
        }
    }

    /// Outbound classification. Blank direction is deliberately treated as
    /// potentially outbound: a false positive costs an analyst a glance, a
    /// false negative misses an exfiltration channel.
    pub fn is_outbound(&self) -> bool {
        let direction = self.direction.to_lowercase();
        direction.is_empty() || direction.contains("outbound") || direction.contains("send")
    }

    /// Normalized subject used for identical-subject grouping.
    pub fn normalized_subject(&self) -> String {
        self.subject.trim().to_lowercase()
    }
}
