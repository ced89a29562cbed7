//! Fully-qualified names for packages, types and enum values
//!
//! A name has the shape `package@major.minor::Name.Sub:VALUE` where every
//! part is optional in the source text. `apply_defaults` fills in the
//! package and version of the enclosing translation unit without
//! overwriting anything that was spelled out.

use std::fmt;

use crate::error::ResolveError;

/// A parsed `package@version::name:valueName` tuple
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FQName {
    package: String,
    version: String,
    name: String,
    value_name: String,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_dotted_identifier(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

fn is_version(s: &str) -> bool {
    match s.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

impl FQName {
    pub fn new(package: &str, version: &str, name: &str) -> FQName {
        FQName {
            package: package.to_string(),
            version: version.to_string(),
            name: name.to_string(),
            value_name: String::new(),
        }
    }

    /// Parse a name as spelled in source text.
    ///
    /// Accepted shapes: `a.b.c@1.0::Name.Sub`, `a.b.c@1.0` (a package
    /// reference), `@1.0::Name` (package defaulted later), and a bare
    /// `Name` or `Name.Sub` (both package and version defaulted or
    /// resolved locally).
    pub fn parse(text: &str) -> Result<FQName, ResolveError> {
        let invalid = || ResolveError::InvalidFqName(text.to_string());

        let (left, rest) = match text.split_once("::") {
            Some((left, rest)) => (left, Some(rest)),
            None => (text, None),
        };

        let (package, version) = if let Some((pkg, ver)) = left.split_once('@') {
            if !pkg.is_empty() && !is_dotted_identifier(pkg) {
                return Err(invalid());
            }
            if !is_version(ver) {
                return Err(invalid());
            }
            (pkg.to_string(), ver.to_string())
        } else if rest.is_some() {
            // "pkg::Name" without a version is not a legal reference.
            return Err(invalid());
        } else {
            (String::new(), String::new())
        };

        let (name, value_name) = match rest {
            Some(r) => match r.split_once(':') {
                Some((n, v)) => (n.to_string(), v.to_string()),
                None => (r.to_string(), String::new()),
            },
            None if package.is_empty() && version.is_empty() => {
                // Bare identifier form.
                (text.to_string(), String::new())
            }
            None => (String::new(), String::new()),
        };

        if !name.is_empty() && !is_dotted_identifier(&name) {
            return Err(invalid());
        }
        if !value_name.is_empty() && !is_identifier(&value_name) {
            return Err(invalid());
        }
        if package.is_empty() && version.is_empty() && name.is_empty() {
            return Err(invalid());
        }

        Ok(FQName {
            package,
            version,
            name,
            value_name,
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Dot-separated components of the type name, outermost first.
    pub fn names(&self) -> Vec<&str> {
        if self.name.is_empty() {
            Vec::new()
        } else {
            self.name.split('.').collect()
        }
    }

    pub fn package_components(&self) -> Vec<&str> {
        if self.package.is_empty() {
            Vec::new()
        } else {
            self.package.split('.').collect()
        }
    }

    /// Either all of package, version and name are present, or this is a
    /// package reference (empty name), or a lone unresolved identifier.
    pub fn is_valid(&self) -> bool {
        if !self.package.is_empty() || !self.version.is_empty() {
            !self.package.is_empty() && !self.version.is_empty()
        } else {
            !self.name.is_empty()
        }
    }

    pub fn is_fully_qualified(&self) -> bool {
        !self.package.is_empty() && !self.version.is_empty() && !self.name.is_empty()
    }

    /// Fill in missing package/version from the enclosing unit. Fields
    /// that are already set are never overwritten.
    pub fn apply_defaults(&mut self, default_package: &str, default_version: &str) {
        if self.package.is_empty() {
            self.package = default_package.to_string();
        }
        if self.version.is_empty() {
            self.version = default_version.to_string();
        }
    }

    /// Suffix match at component granularity: every non-empty field of
    /// `suffix` must match the trailing components of the corresponding
    /// field of `self`. This is the lookup primitive behind imported-type
    /// resolution.
    pub fn ends_with(&self, suffix: &FQName) -> bool {
        if !suffix.package.is_empty() {
            let own = self.package_components();
            let query = suffix.package_components();
            if query.len() > own.len() || own[own.len() - query.len()..] != query[..] {
                return false;
            }
        }
        if !suffix.version.is_empty() && self.version != suffix.version {
            return false;
        }
        if !suffix.name.is_empty() {
            let own = self.names();
            let query = suffix.names();
            if query.len() > own.len() || own[own.len() - query.len()..] != query[..] {
                return false;
            }
        }
        if !suffix.value_name.is_empty() && self.value_name != suffix.value_name {
            return false;
        }
        true
    }

    /// Canonical `package@version::name` rendering.
    pub fn string(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.package);
        if !self.version.is_empty() {
            out.push('@');
            out.push_str(&self.version);
        }
        if !self.name.is_empty() {
            if !out.is_empty() {
                out.push_str("::");
            }
            out.push_str(&self.name);
        }
        if !self.value_name.is_empty() {
            out.push(':');
            out.push_str(&self.value_name);
        }
        out
    }

    /// `@1.0`, or the empty string if no version is set.
    pub fn at_version(&self) -> String {
        if self.version.is_empty() {
            String::new()
        } else {
            format!("@{}", self.version)
        }
    }

    fn version_token(&self) -> String {
        format!("V{}", self.version.replace('.', "_"))
    }

    /// Package and version path components: `["android", "hardware",
    /// "foo", "1.0"]`, with the version rendered `V1_0` when
    /// `cpp_compatible`.
    pub fn package_and_version_components(&self, cpp_compatible: bool) -> Vec<String> {
        let mut components: Vec<String> = self
            .package_components()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if cpp_compatible {
            components.push(self.version_token());
        } else {
            components.push(self.version.clone());
        }
        components
    }

    /// `::android::hardware::foo::V1_0`
    pub fn cpp_namespace(&self) -> String {
        let mut out = String::new();
        for component in self.package_and_version_components(true /* cpp_compatible */) {
            out.push_str("::");
            out.push_str(&component);
        }
        out
    }

    /// `::android::hardware::foo::V1_0::IFoo::Sub`
    pub fn cpp_name(&self) -> String {
        let mut out = self.cpp_namespace();
        for component in self.names() {
            out.push_str("::");
            out.push_str(component);
        }
        out
    }

    /// Identifier-safe rendering: `android_hardware_foo_V1_0_IFoo`.
    pub fn token_name(&self) -> String {
        let mut parts: Vec<String> = self
            .package_components()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if !self.version.is_empty() {
            parts.push(self.version_token());
        }
        parts.extend(self.names().iter().map(|s| s.to_string()));
        parts.join("_")
    }

    /// First component of the type name, `IFoo` for `IFoo.Sub`.
    pub fn interface_name(&self) -> String {
        self.names().first().unwrap_or(&"").to_string()
    }

    /// `Foo` for an interface named `IFoo`.
    pub fn interface_base_name(&self) -> String {
        let iface = self.interface_name();
        match iface.strip_prefix('I') {
            Some(base) if !base.is_empty() => base.to_string(),
            _ => iface,
        }
    }

    pub fn interface_hw_name(&self) -> String {
        format!("IHw{}", self.interface_base_name())
    }

    pub fn interface_stub_name(&self) -> String {
        format!("BnHw{}", self.interface_base_name())
    }

    pub fn interface_proxy_name(&self) -> String {
        format!("BpHw{}", self.interface_base_name())
    }

    pub fn interface_passthrough_name(&self) -> String {
        format!("Bs{}", self.interface_base_name())
    }

    /// The FQName of the sibling artifact `klass` in the same package.
    pub fn with_name(&self, klass: &str) -> FQName {
        FQName::new(&self.package, &self.version, klass)
    }
}

impl fmt::Display for FQName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string())
    }
}
