// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route classification for the session gate.
//!
//! Paths are matched against three pattern lists. Anything that matches none
//! of them falls under [`UnlistedRoutes`]. The default is
//! [`UnlistedRoutes::Public`]: a newly added page is reachable without a
//! session until it is registered as protected.

/// How the gate treats a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires an authenticated session.
    Protected,
    /// Login/signup pages; signed-in users are sent home.
    AuthEntry,
    /// Anything else.
    Public,
}

/// Policy for paths not covered by any pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlistedRoutes {
    Public,
    Protected,
}

/// A single path pattern.
///
/// `/login` matches exactly. `/expenses/*` matches `/expenses` and anything
/// below it on a segment boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_suffix("/*") {
            Some(base) => PathPattern::Prefix(base.trim_end_matches('/').to_string()),
            None => PathPattern::Exact(normalize(raw).to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            PathPattern::Exact(p) => path == p,
            // "/*" parses to an empty base and covers every path
            PathPattern::Prefix(base) if base.is_empty() => true,
            PathPattern::Prefix(base) => match path.strip_prefix(base.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// Strip a trailing slash, keeping the root as "/".
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Route protection table, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    protected: Vec<PathPattern>,
    auth_entry: Vec<PathPattern>,
    public: Vec<PathPattern>,
    unlisted: UnlistedRoutes,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            protected: parse_all(["/", "/expenses/*", "/settings/*", "/api/*"]),
            auth_entry: parse_all(["/login", "/signup"]),
            public: parse_all(["/auth/*", "/health", "/reset-password"]),
            unlisted: UnlistedRoutes::Public,
        }
    }
}

fn parse_all<I, S>(patterns: I) -> Vec<PathPattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| PathPattern::parse(p.as_ref()))
        .collect()
}

impl RouteTable {
    pub fn with_protected<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protected = parse_all(patterns);
        self
    }

    pub fn with_public<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.public = parse_all(patterns);
        self
    }

    pub fn with_unlisted(mut self, unlisted: UnlistedRoutes) -> Self {
        self.unlisted = unlisted;
        self
    }

    pub fn unlisted(&self) -> UnlistedRoutes {
        self.unlisted
    }

    /// Classify a request path.
    ///
    /// Auth entry pages win over everything, then explicit public patterns,
    /// then protected patterns, then the unlisted policy.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.auth_entry.iter().any(|p| p.matches(path)) {
            return RouteClass::AuthEntry;
        }
        if self.public.iter().any(|p| p.matches(path)) {
            return RouteClass::Public;
        }
        if self.protected.iter().any(|p| p.matches(path)) {
            return RouteClass::Protected;
        }
        match self.unlisted {
            UnlistedRoutes::Public => RouteClass::Public,
            UnlistedRoutes::Protected => RouteClass::Protected,
        }
    }
}
