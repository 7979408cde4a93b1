//! Permission grammar validator for the Permissions columns.
//!
//! A field is a ` | `-separated list of `Account: Token[ (Scope)]` entries.
//! The token vocabulary is closed: it is exactly what the scanning tool
//! emits, so anything else means version skew or corruption.

use std::sync::OnceLock;

use regex::Regex;

/// Separator between entries of one permissions field.
pub const ENTRY_SEPARATOR: &str = " | ";

/// Separator between account and access token inside one entry.
pub const ACCOUNT_SEPARATOR: &str = ": ";

/// Only accepted spelling of full control; case-sensitive.
pub const FULL_CONTROL: &str = "full";

/// Symbolic read/write/execute combinations, matched case-insensitively.
pub const SYMBOLIC_TOKENS: [&str; 8] = [
    "+r+w+x", "-r-w-x", "+r+x", "-r-x", "+r", "-r", "+x", "-x",
];

/// Inheritance-scope qualifiers, matched case-insensitively. No qualifier
/// means the default "this container, subcontainers and objects".
pub const SCOPE_QUALIFIERS: [&str; 6] = [
    "This Container Only",
    "This Container and Subcontainers",
    "This Container and Objects",
    "Subcontainers and Objects Only",
    "Subcontainers Only",
    "Objects Only",
];

/// Outcome of validating one permissions field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCheck {
    /// Entries in the field.
    pub entries: usize,
    /// Entry-level problems, one message per offending entry.
    pub problems: Vec<String>,
    /// The field carried the scanner's access-denied placeholder.
    pub unreadable: bool,
    /// Accounts whose SID could not be translated because of a broken trust.
    pub trust_failures: usize,
}

impl PermissionCheck {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    /// All problems joined into one warning message.
    pub fn message(&self) -> Option<String> {
        if self.problems.is_empty() {
            None
        } else {
            Some(self.problems.join("; "))
        }
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"^(?P<token>[^\s()]+)(?:\s+\((?P<scope>[^()]*)\))?$")
            .expect("token grammar pattern is a valid regex")
    })
}

fn unreadable_regex() -> &'static Regex {
    static UNREADABLE: OnceLock<Regex> = OnceLock::new();
    UNREADABLE.get_or_init(|| {
        Regex::new(r"(?i)^<?\s*access (?:is )?denied\.?\s*>?$")
            .expect("unreadable placeholder pattern is a valid regex")
    })
}

fn trust_failure_regex() -> &'static Regex {
    static TRUST: OnceLock<Regex> = OnceLock::new();
    TRUST.get_or_init(|| {
        Regex::new(r"(?i)trust relationship between .+ failed")
            .expect("trust failure pattern is a valid regex")
    })
}

/// Whether `text` is the scanner's placeholder for an item it could not read.
pub fn is_unreadable_placeholder(text: &str) -> bool {
    unreadable_regex().is_match(text.trim())
}

/// Whether `account` is the SID-translation failure caused by a broken domain trust.
pub fn is_trust_failure(account: &str) -> bool {
    trust_failure_regex().is_match(account)
}

/// Whether `token` is a recognized access token (without scope).
pub fn is_known_token(token: &str) -> bool {
    token == FULL_CONTROL
        || SYMBOLIC_TOKENS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(token))
}

/// Whether `scope` is one of the recognized inheritance qualifiers.
pub fn is_known_scope(scope: &str) -> bool {
    SCOPE_QUALIFIERS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(scope.trim()))
}

/// Validate a whole permissions field.
///
/// An empty field is valid with zero entries; the caller decides whether an
/// empty value matters.
pub fn validate(raw: &str) -> PermissionCheck {
    let mut check = PermissionCheck::default();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return check;
    }

    for entry in trimmed.split(ENTRY_SEPARATOR) {
        check.entries += 1;
        let entry = entry.trim();

        if is_unreadable_placeholder(entry) {
            check.unreadable = true;
            continue;
        }

        let parts: Vec<&str> = entry.split(ACCOUNT_SEPARATOR).collect();
        let [account, access] = parts.as_slice() else {
            check.problems.push(format!(
                "entry {entry:?} is not of the form `Account: Permission`"
            ));
            continue;
        };

        if account.trim().is_empty() {
            check.problems.push(format!("entry {entry:?} has an empty account"));
            continue;
        }
        if is_trust_failure(account) {
            check.trust_failures += 1;
        }

        if is_unreadable_placeholder(access) {
            check.unreadable = true;
            continue;
        }

        let Some(caps) = token_regex().captures(access.trim()) else {
            check.problems.push(format!(
                "entry {entry:?} has malformed permission {access:?}"
            ));
            continue;
        };
        let token = &caps["token"];
        if !is_known_token(token) {
            check.problems.push(format!(
                "entry {entry:?} has unrecognized permission {token:?}"
            ));
            continue;
        }
        if let Some(scope) = caps.name("scope")
            && !is_known_scope(scope.as_str())
        {
            check.problems.push(format!(
                "entry {entry:?} has unrecognized inheritance scope {:?}",
                scope.as_str()
            ));
        }
    }

    check
}
