//! Target and resource-URI parsing, and the ordered pattern router.
//!
//! The router holds a flat, insertion-ordered table of
//! `(scheme, template, handler, bound host)` tuples. Matching walks the table
//! and the first hit wins, so a scheme's catch-all must come last; that
//! ordering is enforced when patterns are registered, not trusted.

use crate::utils::error::{Result, ScoutError};
use std::collections::HashMap;

/// Parsed tool target: the literal `hosts` listing, or one host's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Hosts,
    Path { host: String, path: String },
}

/// Parse a tool target of the form `hosts` or `host:/path`. The path is
/// preserved verbatim; a leading slash is not required here.
pub fn parse_target(input: &str) -> Result<Target> {
    if input.contains('\0') {
        return Err(ScoutError::InvalidTarget(
            "target contains a NUL byte".to_string(),
        ));
    }
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("hosts") {
        return Ok(Target::Hosts);
    }

    match trimmed.split_once(':') {
        Some((host, path)) if !host.is_empty() && !path.is_empty() => Ok(Target::Path {
            host: host.to_string(),
            path: path.to_string(),
        }),
        _ => Err(ScoutError::InvalidTarget(format!(
            "'{}' is neither 'hosts' nor 'host:/path'",
            trimmed
        ))),
    }
}

/// A resource URI split into its scheme and slash segments. The part after
/// `scheme://` may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    pub scheme: String,
    pub segments: Vec<String>,
}

pub fn parse_resource_uri(input: &str) -> Result<ResourceUri> {
    if input.contains('\0') {
        return Err(ScoutError::InvalidTarget(
            "URI contains a NUL byte".to_string(),
        ));
    }
    let trimmed = input.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(ScoutError::InvalidTarget(format!(
            "'{}' is not a scheme://... URI",
            trimmed
        )));
    };
    if scheme.is_empty() {
        return Err(ScoutError::InvalidTarget(format!(
            "'{}' has an empty scheme",
            trimmed
        )));
    }

    let segments = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split('/').map(str::to_string).collect()
    };
    Ok(ResourceUri {
        scheme: scheme.to_string(),
        segments,
    })
}

/// Which dispatch function serves a matched pattern. Data-driven rather than
/// closure-per-host so the table stays introspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerId {
    HostsList,
    ScoutPath,
    DockerLogs,
    DockerList,
    ComposeList,
    ComposeFile,
    ComposeLogs,
    ZfsSummary,
    ZfsPool,
    ZfsDatasets,
    ZfsSnapshots,
    Syslog,
    HostPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub scheme: String,
    pub template: String,
    pub handler: HandlerId,
    /// Host this pattern was registered for; `None` for cross-scheme ones.
    pub bound_host: Option<String>,
    segments: Vec<Segment>,
}

impl Route {
    fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard(_)))
    }
}

/// A successful match: the handler, its bound host, and extracted params.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub handler: HandlerId,
    pub bound_host: Option<&'a str>,
    pub params: HashMap<String, String>,
}

impl RouteMatch<'_> {
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one pattern. Fails if the scheme already ends in a wildcard
    /// pattern, which would shadow everything added after it.
    pub fn register(
        &mut self,
        scheme: &str,
        template: &str,
        handler: HandlerId,
        bound_host: Option<&str>,
    ) -> Result<()> {
        if let Some(shadow) = self
            .routes
            .iter()
            .find(|r| r.scheme == scheme && r.has_wildcard())
        {
            return Err(ScoutError::Config(format!(
                "Pattern '{}://{}' is unreachable behind catch-all '{}://{}'",
                scheme, template, shadow.scheme, shadow.template
            )));
        }

        let segments = if template.is_empty() {
            Vec::new()
        } else {
            template.split('/').map(parse_segment).collect()
        };

        self.routes.push(Route {
            scheme: scheme.to_string(),
            template: template.to_string(),
            handler,
            bound_host: bound_host.map(str::to_string),
            segments,
        });
        Ok(())
    }

    /// Register the canonical pattern set for one host scheme, specific
    /// patterns first, the path catch-all last.
    pub fn register_host(&mut self, host: &str) -> Result<()> {
        use HandlerId::*;
        const HOST_PATTERNS: &[(&str, HandlerId)] = &[
            ("docker/{container}/logs", DockerLogs),
            ("docker", DockerList),
            ("compose", ComposeList),
            ("compose/{project}", ComposeFile),
            ("compose/{project}/logs", ComposeLogs),
            ("zfs", ZfsSummary),
            ("zfs/{pool}", ZfsPool),
            ("zfs/{pool}/datasets", ZfsDatasets),
            ("zfs/snapshots", ZfsSnapshots),
            ("syslog", Syslog),
            ("{path*}", HostPath),
        ];
        for (template, handler) in HOST_PATTERNS {
            self.register(host, template, *handler, Some(host))?;
        }
        Ok(())
    }

    /// Register the cross-scheme patterns shared by every deployment.
    pub fn register_global(&mut self) -> Result<()> {
        self.register("scout", "{host}/{path*}", HandlerId::ScoutPath, None)?;
        self.register("hosts", "list", HandlerId::HostsList, None)?;
        Ok(())
    }

    /// First-match resolution in insertion order.
    pub fn resolve(&self, uri: &ResourceUri) -> Option<RouteMatch<'_>> {
        'routes: for route in &self.routes {
            if route.scheme != uri.scheme {
                continue;
            }

            let mut params = HashMap::new();
            let mut pos = 0usize;
            for segment in &route.segments {
                match segment {
                    Segment::Literal(lit) => {
                        if uri.segments.get(pos).map(String::as_str) != Some(lit.as_str()) {
                            continue 'routes;
                        }
                        pos += 1;
                    }
                    Segment::Param(name) => {
                        let Some(value) = uri.segments.get(pos) else {
                            continue 'routes;
                        };
                        params.insert(name.clone(), value.clone());
                        pos += 1;
                    }
                    Segment::Wildcard(name) => {
                        let rest = uri.segments[pos.min(uri.segments.len())..].join("/");
                        params.insert(name.clone(), rest);
                        pos = uri.segments.len();
                    }
                }
            }
            if pos != uri.segments.len() {
                continue;
            }

            return Some(RouteMatch {
                handler: route.handler,
                bound_host: route.bound_host.as_deref(),
                params,
            });
        }
        None
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn parse_segment(raw: &str) -> Segment {
    if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix("*}")) {
        Segment::Wildcard(inner.to_string())
    } else if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Segment::Param(inner.to_string())
    } else {
        Segment::Literal(raw.to_string())
    }
}
