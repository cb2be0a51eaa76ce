use crate::config::SshSettings;
use crate::utils::error::{Result, ScoutError};
use regex::Regex;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub mod probe;

/// One SSH destination. `name` is the unique key used by the pool and as the
/// host's resource scheme; it is distinct from `hostname:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl Host {
    /// `user@hostname:port`, the form shown in listings and logs.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.hostname, self.port)
    }
}

/// Immutable, insertion-ordered host table loaded once at startup.
#[derive(Debug, Clone)]
pub struct HostTable {
    hosts: Vec<Host>,
}

impl HostTable {
    /// Build a table, rejecting duplicate names.
    pub fn new(hosts: Vec<Host>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for host in &hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(ScoutError::Config(format!(
                    "Duplicate host name '{}' in SSH config",
                    host.name
                )));
            }
        }
        Ok(Self { hosts })
    }

    /// Load the table from an SSH client config, applying the allow/block
    /// filter. Wildcard and negated stanzas never become hosts.
    pub fn load(settings: &SshSettings) -> Result<Self> {
        let file = File::open(&settings.config_path).map_err(|e| {
            ScoutError::Config(format!(
                "Cannot read SSH config {}: {}",
                settings.config_path.display(),
                e
            ))
        })?;
        let mut reader = BufReader::new(file);
        let parsed = ssh2_config::SshConfig::default()
            .parse(&mut reader, ssh2_config::ParseRule::ALLOW_UNKNOWN_FIELDS)
            .map_err(|e| {
                ScoutError::Config(format!(
                    "Cannot parse SSH config {}: {}",
                    settings.config_path.display(),
                    e
                ))
            })?;

        let filter = HostFilter::compile(settings)?;
        let default_user = env::var("USER").unwrap_or_else(|_| "root".to_string());

        let mut hosts = Vec::new();
        for entry in parsed.get_hosts() {
            let Some(clause) = entry.pattern.first() else {
                continue;
            };
            let name = clause.pattern.clone();
            if clause.negated || name.contains('*') || name.contains('?') {
                continue;
            }
            if !filter.permits(&name) {
                debug!("Host '{}' excluded by allow/block patterns", name);
                continue;
            }

            let params = &entry.params;
            let host = Host {
                hostname: params.host_name.clone().unwrap_or_else(|| name.clone()),
                port: params.port.unwrap_or(22),
                user: params.user.clone().unwrap_or_else(|| default_user.clone()),
                identity_file: params
                    .identity_file
                    .as_ref()
                    .and_then(|files| files.first().cloned()),
                name,
            };
            hosts.push(host);
        }

        if hosts.is_empty() {
            warn!(
                "No usable hosts found in {}",
                settings.config_path.display()
            );
        } else {
            for host in &hosts {
                info!("Loaded host '{}' ({})", host.name, host.address());
            }
        }

        Self::new(hosts)
    }

    pub fn get(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn as_slice(&self) -> &[Host] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Comma-joined names for unknown-host error messages.
    pub fn available(&self) -> String {
        self.hosts
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compiled allow/block name patterns. A nonempty allowlist takes precedence;
/// otherwise anything not blocked is permitted.
#[derive(Debug)]
struct HostFilter {
    allow: Vec<Regex>,
    block: Vec<Regex>,
}

impl HostFilter {
    fn compile(settings: &SshSettings) -> Result<Self> {
        Ok(Self {
            allow: compile_patterns(&settings.allowlist)?,
            block: compile_patterns(&settings.blocklist)?,
        })
    }

    fn permits(&self, name: &str) -> bool {
        if !self.allow.is_empty() {
            return self.allow.iter().any(|re| re.is_match(name));
        }
        !self.block.iter().any(|re| re.is_match(name))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&wildcard_to_regex(p))
                .map_err(|e| ScoutError::Config(format!("Invalid host pattern '{}': {}", p, e)))
        })
        .collect()
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            ch => {
                if "[]{}()|^$+.\\".contains(ch) {
                    regex.push('\\');
                }
                regex.push(ch);
            }
        }
    }
    regex.push('$');
    regex
}
