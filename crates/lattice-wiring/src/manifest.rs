//! Manifest header names and clause parsing.
//!
//! A header value is a list of clauses separated by commas. Each clause is a
//! `;`-separated list of names followed by `attr=value` attributes and
//! `directive:=value` directives:
//!
//! ```text
//! com.foo;com.bar;version="[1.0,2.0)";resolution:=optional, com.baz;version=3
//! ```
//!
//! Commas and semicolons inside double quotes never split. A bare name that
//! follows attributes starts a new clause, so the `;`-only form
//! `a;version=1;b;version=2` is read as two clauses.

use std::collections::BTreeMap;

/// Well-known manifest header names.
pub mod headers {
    /// Packages offered to other units.
    pub const EXPORT_PACKAGE: &str = "Export-Package";
    /// Packages required from other units.
    pub const IMPORT_PACKAGE: &str = "Import-Package";
    /// Patterns of packages that may be wired on first use.
    pub const DYNAMIC_IMPORT_PACKAGE: &str = "DynamicImport-Package";
    /// Whole-unit dependencies.
    pub const REQUIRE_BUNDLE: &str = "Require-Bundle";
    /// Unit name used by whole-unit dependencies and fragments.
    pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
    /// Unit version.
    pub const BUNDLE_VERSION: &str = "Bundle-Version";
    /// Class turned into the unit's activator.
    pub const BUNDLE_ACTIVATOR: &str = "Bundle-Activator";
    /// Lazy activation policy.
    pub const BUNDLE_ACTIVATION_POLICY: &str = "Bundle-ActivationPolicy";
    /// Host a fragment attaches to.
    pub const FRAGMENT_HOST: &str = "Fragment-Host";
    /// Generic capabilities offered by the unit.
    pub const PROVIDE_CAPABILITY: &str = "Provide-Capability";
}

/// One parsed manifest clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
    /// Names the clause applies to (package names, unit names, namespaces).
    pub names: Vec<String>,
    /// `key=value` attributes, values unquoted.
    pub attributes: BTreeMap<String, String>,
    /// `key:=value` directives, values unquoted.
    pub directives: BTreeMap<String, String>,
}

impl Clause {
    /// Attribute lookup.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Directive lookup.
    #[must_use]
    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives.get(key).map(String::as_str)
    }

    /// `version`, falling back to the legacy `specification-version`.
    #[must_use]
    pub fn version_attribute(&self) -> Option<&str> {
        self.attribute("version")
            .or_else(|| self.attribute("specification-version"))
    }

    /// Comma-separated directive value split into trimmed items.
    #[must_use]
    pub fn directive_list(&self, key: &str) -> Vec<String> {
        self.directive(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_parameters(&self) -> bool {
        !self.attributes.is_empty() || !self.directives.is_empty()
    }
}

/// Parse a header value into clauses. Empty input yields no clauses.
#[must_use]
pub fn parse_header(value: &str) -> Vec<Clause> {
    let mut clauses = Vec::new();
    for raw in split_unquoted(value, ',') {
        let mut current = Clause::default();
        for token in split_unquoted(raw, ';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Some((key, val)) = token.split_once(":=") {
                current
                    .directives
                    .insert(key.trim().to_owned(), unquote(val).to_owned());
            } else if let Some((key, val)) = token.split_once('=') {
                current
                    .attributes
                    .insert(key.trim().to_owned(), unquote(val).to_owned());
            } else {
                if current.has_parameters() {
                    clauses.push(std::mem::take(&mut current));
                }
                current.names.push(token.to_owned());
            }
        }
        if !current.names.is_empty() {
            clauses.push(current);
        }
    }
    clauses
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i.saturating_add(c.len_utf8());
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unquote(s: &str) -> &str {
    let t = s.trim();
    t.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(t)
}

/// The manifest-derived strings a declaration set is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestHeaders {
    /// `Export-Package` value.
    pub exports: Option<String>,
    /// `Import-Package` value.
    pub imports: Option<String>,
    /// `DynamicImport-Package` value.
    pub dynamic_imports: Option<String>,
    /// `Require-Bundle` value.
    pub requires: Option<String>,
    /// `Bundle-SymbolicName` value.
    pub symbolic_name: Option<String>,
    /// `Bundle-Version` value.
    pub version: Option<String>,
}

impl ManifestHeaders {
    /// Collect the relevant headers through a lookup function.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            exports: lookup(headers::EXPORT_PACKAGE),
            imports: lookup(headers::IMPORT_PACKAGE),
            dynamic_imports: lookup(headers::DYNAMIC_IMPORT_PACKAGE),
            requires: lookup(headers::REQUIRE_BUNDLE),
            symbolic_name: lookup(headers::BUNDLE_SYMBOLIC_NAME),
            version: lookup(headers::BUNDLE_VERSION),
        }
    }

    /// Set the export list.
    #[must_use]
    pub fn with_exports(mut self, v: impl Into<String>) -> Self {
        self.exports = Some(v.into());
        self
    }

    /// Set the import list.
    #[must_use]
    pub fn with_imports(mut self, v: impl Into<String>) -> Self {
        self.imports = Some(v.into());
        self
    }

    /// Set the dynamic-import list.
    #[must_use]
    pub fn with_dynamic_imports(mut self, v: impl Into<String>) -> Self {
        self.dynamic_imports = Some(v.into());
        self
    }

    /// Set the required units.
    #[must_use]
    pub fn with_requires(mut self, v: impl Into<String>) -> Self {
        self.requires = Some(v.into());
        self
    }

    /// Set the unit's symbolic name and version.
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.symbolic_name = Some(name.into());
        self.version = Some(version.into());
        self
    }

    /// The symbolic name without its directives.
    #[must_use]
    pub fn symbolic_name(&self) -> Option<String> {
        self.symbolic_name
            .as_deref()
            .and_then(|v| parse_header(v).into_iter().next())
            .and_then(|c| c.names.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_clauses_with_parameters() {
        let clauses =
            parse_header("com.foo;version=\"[1.0,2.0)\";resolution:=optional, com.bar");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].names, vec!["com.foo"]);
        assert_eq!(clauses[0].version_attribute(), Some("[1.0,2.0)"));
        assert_eq!(clauses[0].directive("resolution"), Some("optional"));
        assert_eq!(clauses[1].names, vec!["com.bar"]);
        assert!(clauses[1].attributes.is_empty());
    }

    #[test]
    fn shared_parameters_apply_to_all_names() {
        let clauses = parse_header("a;b;version=2");
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].names, vec!["a", "b"]);
        assert_eq!(clauses[0].version_attribute(), Some("2"));
    }

    #[test]
    fn semicolon_only_list_splits_on_new_names() {
        let clauses = parse_header("a;version=1;b;version=2");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].names, vec!["a"]);
        assert_eq!(clauses[1].names, vec!["b"]);
        assert_eq!(clauses[1].version_attribute(), Some("2"));
    }

    #[test]
    fn legacy_specification_version_is_a_synonym() {
        let clauses = parse_header("a;specification-version=1.1");
        assert_eq!(clauses[0].version_attribute(), Some("1.1"));
    }

    #[test]
    fn directive_lists_keep_quoted_commas() {
        let clauses = parse_header("lazy;include:=\"com.a, com.b\"");
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].directive_list("include"), vec!["com.a", "com.b"]);
    }

    #[test]
    fn empty_header_has_no_clauses() {
        assert!(parse_header("").is_empty());
        assert!(parse_header(" , ;").is_empty());
    }

    #[test]
    fn symbolic_name_drops_directives() {
        let headers = ManifestHeaders {
            symbolic_name: Some("org.example.core;singleton:=true".into()),
            ..ManifestHeaders::default()
        };
        assert_eq!(headers.symbolic_name().as_deref(), Some("org.example.core"));
    }
}
