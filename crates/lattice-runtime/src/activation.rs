//! `Bundle-ActivationPolicy` handling.

use lattice_wiring::parse_header;

/// Which class loads trigger a lazily started unit's activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationPolicy {
    lazy: bool,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ActivationPolicy {
    /// Read the policy header. Anything other than `lazy` means eager.
    #[must_use]
    pub fn parse(header: Option<&str>) -> Self {
        let Some(clause) = header.and_then(|h| parse_header(h).into_iter().next()) else {
            return Self::default();
        };
        if !clause.names.iter().any(|n| n == "lazy") {
            return Self::default();
        }
        Self {
            lazy: true,
            include: clause.directive_list("include"),
            exclude: clause.directive_list("exclude"),
        }
    }

    /// A lazy policy with no package restrictions.
    #[must_use]
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    /// Whether the unit declares lazy activation.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Whether loading `class_name` from the unit triggers its activation.
    #[must_use]
    pub fn is_trigger(&self, class_name: &str) -> bool {
        if !self.lazy {
            return false;
        }
        let pkg = class_name.rsplit_once('.').map_or("", |(p, _)| p);
        if self.exclude.iter().any(|p| p == pkg) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p == pkg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_unknown_policy_is_eager() {
        assert!(!ActivationPolicy::parse(None).is_lazy());
        assert!(!ActivationPolicy::parse(Some("eager")).is_trigger("a.B"));
    }

    #[test]
    fn lazy_without_filters_triggers_on_everything() {
        let policy = ActivationPolicy::parse(Some("lazy"));
        assert!(policy.is_lazy());
        assert!(policy.is_trigger("a.b.C"));
        assert!(policy.is_trigger("Toplevel"));
    }

    #[test]
    fn include_and_exclude_filter_by_package() {
        let policy =
            ActivationPolicy::parse(Some(r#"lazy;include:="com.api,com.impl";exclude:="com.impl""#));
        assert!(policy.is_trigger("com.api.Service"));
        assert!(!policy.is_trigger("com.impl.ServiceImpl"));
        assert!(!policy.is_trigger("com.other.Thing"));
    }
}
