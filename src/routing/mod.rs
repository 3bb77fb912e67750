//! Declarative access rules. Each resource family contributes a table of
//! `{methods, pattern, access}` rows and [`RouteTable::classify`] is the only
//! matcher.

pub mod rules;

use axum::http::Method;
use regex::Regex;

use crate::auth::RoleSet;
use crate::database::ID_LENGTH;

/// What a caller needs in order to reach a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No credentials needed
    Public,
    /// Callers holding a refresh token are turned away
    Anonymous,
    /// Any valid session
    Authenticated,
    /// Valid session whose roles intersect the set
    Roles(RoleSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Matched(Access),
    MethodNotAllowed,
    Unrouted,
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    methods: Vec<Method>,
    pattern: Regex,
    access: Access,
}

impl RouteRule {
    /// `path` is anchored; `{id}` and `{target}` expand to id segments.
    pub fn new(methods: &[Method], path: &str, access: Access) -> Result<Self, regex::Error> {
        let expanded = path
            .replace("{id}", &id_segment("id"))
            .replace("{target}", &id_segment("target"));

        Ok(Self {
            methods: methods.to_vec(),
            pattern: Regex::new(&format!("^{}$", expanded))?,
            access,
        })
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    fn matches_path(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method) || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }
}

fn id_segment(name: &str) -> String {
    format!("(?<{}>[A-Za-z0-9]{{{}}})", name, ID_LENGTH)
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// Every rule the API serves.
    pub fn standard() -> Result<Self, regex::Error> {
        Ok(Self::new(rules::all()?))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose pattern and method both match wins. A path that only
    /// matches under other methods is `MethodNotAllowed`.
    pub fn classify(&self, method: &Method, path: &str) -> RouteMatch {
        let mut path_known = false;

        for rule in &self.rules {
            if !rule.matches_path(path) {
                continue;
            }
            if rule.accepts(method) {
                return RouteMatch::Matched(rule.access.clone());
            }
            path_known = true;
        }

        if path_known {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::Unrouted
        }
    }
}
