//! Identity canonicalization and the admin-account predicate
//!
//! Raw email strings arrive in many spellings of the same mailbox. Every
//! aggregate in this crate is keyed by [`Identity`], the canonical form
//! produced by [`EmailRules::canonicalize`]:
//!
//! 1. lower-case and trim
//! 2. split at the last `@`
//! 3. fold domain aliases (`googlemail.com` → `gmail.com`)
//! 4. drop dots from the local part for dot-insensitive providers
//! 5. drop a `+tag` suffix for providers with sub-addressing
//!
//! Canonicalization is idempotent.
//!
//! Admin accounts (`master1@ac.jp` .. `master30@ac.jp`) are recognised by
//! [`admin_number`], the only admin check in the crate.

use crate::config::IdentityConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Consumer providers that ignore dots in the local part.
const DOTLESS_DOMAINS: &[&str] = &["gmail.com"];

/// Providers that deliver `local+tag@domain` to `local@domain`.
const SUBADDRESS_DOMAINS: &[&str] = &[
    "gmail.com",
    "outlook.com",
    "outlook.jp",
    "hotmail.com",
    "live.com",
    "icloud.com",
    "fastmail.com",
    "proton.me",
];

/// Alternate domains of the same provider.
const DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("googlemail.com", "gmail.com"),
    ("me.com", "icloud.com"),
    ("mac.com", "icloud.com"),
    ("protonmail.com", "proton.me"),
    ("pm.me", "proton.me"),
];

/// Admin mailboxes: `master<N>` (or the legacy `mster<N>`) under `ac.jp`.
static ADMIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:master|mster)([0-9]{1,2})@(?:[a-z0-9-]+\.)*ac\.jp$")
        .expect("admin pattern is valid")
});

/// Lowest and highest admin account numbers.
pub const ADMIN_NUMBER_RANGE: std::ops::RangeInclusive<u8> = 1..=30;

// ============================================
// Canonicalization
// ============================================

/// Provider tables driving canonicalization.
#[derive(Debug, Clone)]
pub struct EmailRules {
    dotless: HashSet<String>,
    subaddress: HashSet<String>,
    aliases: HashMap<String, String>,
}

impl Default for EmailRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EmailRules {
    /// Built-in provider tables only.
    pub fn builtin() -> Self {
        Self {
            dotless: DOTLESS_DOMAINS.iter().map(|d| d.to_string()).collect(),
            subaddress: SUBADDRESS_DOMAINS.iter().map(|d| d.to_string()).collect(),
            aliases: DOMAIN_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
        }
    }

    /// Built-in tables extended by the `[identity]` config section.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let mut rules = Self::builtin();
        let norm = |d: &String| d.trim().to_lowercase();
        rules.dotless.extend(config.dotless_domains.iter().map(norm));
        rules
            .subaddress
            .extend(config.subaddress_domains.iter().map(norm));
        for (alias, canonical) in &config.domain_aliases {
            let (alias, canonical) = (norm(alias), norm(canonical));
            if alias != canonical {
                rules.aliases.insert(alias, canonical);
            }
        }
        rules.flatten_aliases();
        rules
    }

    /// Point every alias directly at the domain its chain ends on.
    ///
    /// An alias whose chain runs into a cycle has no final domain and is
    /// dropped, so every alias target is itself never an alias.
    fn flatten_aliases(&mut self) {
        let mut resolved = HashMap::with_capacity(self.aliases.len());
        for alias in self.aliases.keys() {
            let mut seen = HashSet::from([alias.as_str()]);
            let mut current = alias.as_str();
            let mut cyclic = false;
            while let Some(next) = self.aliases.get(current) {
                if !seen.insert(next.as_str()) {
                    cyclic = true;
                    break;
                }
                current = next;
            }
            if cyclic {
                tracing::warn!(alias = %alias, "Dropping cyclic domain alias");
            } else {
                resolved.insert(alias.clone(), current.to_string());
            }
        }
        self.aliases = resolved;
    }

    fn fold_domain<'a>(&'a self, domain: &'a str) -> &'a str {
        self.aliases.get(domain).map(String::as_str).unwrap_or(domain)
    }

    /// Canonical spelling of a raw email string.
    ///
    /// Total over all inputs; strings without `@` are only case-folded and trimmed.
    pub fn canonicalize(&self, raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        let lowered = lowered.trim();
        let Some((local, domain)) = lowered.rsplit_once('@') else {
            return lowered.to_string();
        };

        let domain = self.fold_domain(domain);
        let mut local = local.to_string();
        if self.subaddress.contains(domain) {
            if let Some(plus) = local.find('+') {
                local.truncate(plus);
            }
        }
        if self.dotless.contains(domain) {
            local.retain(|c| c != '.');
        }

        format!("{}@{}", local, domain)
    }

    /// Canonical identity for a raw email, if it looks like a mailbox.
    pub fn identity(&self, raw: &str) -> Option<Identity> {
        let canonical = self.canonicalize(raw);
        let (local, domain) = canonical.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Identity(canonical))
    }
}

// ============================================
// Identity
// ============================================

/// Canonical representation of one person across raw records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// The canonical email string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Admin account number, if this is an admin identity.
    pub fn admin_number(&self) -> Option<u8> {
        admin_number(&self.0)
    }

    /// Whether this identity belongs to the admin cohort.
    pub fn is_admin(&self) -> bool {
        self.admin_number().is_some()
    }

    /// Cohort this admin identity is reported under.
    pub fn admin_cohort(&self) -> Option<AdminCohort> {
        self.admin_number().and_then(AdminCohort::for_number)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================
// Admin accounts
// ============================================

/// Admin account number for an email, or `None` for ordinary accounts.
///
/// Accepts raw or canonical input; matching is case-insensitive.
pub fn admin_number(email: &str) -> Option<u8> {
    let email = email.trim().to_lowercase();
    let caps = ADMIN_PATTERN.captures(&email)?;
    let number: u8 = caps.get(1)?.as_str().parse().ok()?;
    ADMIN_NUMBER_RANGE.contains(&number).then_some(number)
}

/// Whether an email belongs to an admin account.
pub fn is_admin_email(email: &str) -> bool {
    admin_number(email).is_some()
}

/// Numeric sub-range admin identities are reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdminCohort {
    /// master1 .. master10
    First,
    /// master11 .. master20
    Second,
    /// master21 .. master30
    Third,
}

impl AdminCohort {
    /// All cohorts in report order.
    pub const ALL: [AdminCohort; 3] = [AdminCohort::First, AdminCohort::Second, AdminCohort::Third];

    /// Cohort for an admin account number.
    pub fn for_number(number: u8) -> Option<Self> {
        match number {
            1..=10 => Some(AdminCohort::First),
            11..=20 => Some(AdminCohort::Second),
            21..=30 => Some(AdminCohort::Third),
            _ => None,
        }
    }

    /// Label used in output tables (e.g. "1-10").
    pub fn label(&self) -> &'static str {
        match self {
            AdminCohort::First => "1-10",
            AdminCohort::Second => "11-20",
            AdminCohort::Third => "21-30",
        }
    }
}
