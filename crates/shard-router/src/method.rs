//! Fully-qualified RPC method names.

use std::fmt;

use crate::error::{Error, Result};

/// A parsed `/{package}.{Service}/{Method}` name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodName {
    package: String,
    service: String,
    method: String,
}

impl MethodName {
    /// Parses a fully-qualified method name.
    ///
    /// The package may itself be dotted: `/a.b.Svc/Get` has package `a.b`
    /// and service `Svc`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMethod`] if the name does not match the grammar
    /// or any component is empty.
    pub fn parse(full: &str) -> Result<Self> {
        let invalid = || Error::invalid_method(format!("'{full}' is not /package.Service/Method"));

        let rest = full.strip_prefix('/').ok_or_else(invalid)?;
        let (qualified_service, method) = rest.split_once('/').ok_or_else(invalid)?;
        let (package, service) = qualified_service.rsplit_once('.').ok_or_else(invalid)?;

        if package.is_empty()
            || service.is_empty()
            || method.is_empty()
            || method.contains('/')
            || package.split('.').any(str::is_empty)
        {
            return Err(invalid());
        }

        Ok(Self {
            package: package.to_string(),
            service: service.to_string(),
            method: method.to_string(),
        })
    }

    /// The package component.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The service component.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The method component.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns `package.Service`, the key of the per-service indexes.
    #[must_use]
    pub fn service_key(&self) -> String {
        service_key(&self.package, &self.service)
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}.{}/{}", self.package, self.service, self.method)
    }
}

/// Joins a package and service into the per-service index key.
pub(crate) fn service_key(package: &str, service: &str) -> String {
    format!("{package}.{service}")
}
