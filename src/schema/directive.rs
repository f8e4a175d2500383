//! Constraint directives as a closed set.

use super::DirectiveUse;
use crate::model::Value;
use crate::{Error, Result};

/// A directive the synthesizer understands.
///
/// Unknown directive names in a schema are ignored by [`Directive::from_use`];
/// everything returned here must be handled by an exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `@noloops`: no edge of the field may point back at its source.
    NoLoops,
    /// `@distinct`: no two edges of the field from one source share a target.
    Distinct,
    /// `@uniqueForTarget`: a target has at most one incoming edge of the field.
    UniqueForTarget,
    /// Inherited `@uniqueForTarget`, counted across all implementers of `interface`.
    UniqueForTargetAccordingToInterface { interface: String },
    /// `@requiredForTarget`: every target instance has an incoming edge of the field.
    RequiredForTarget,
    /// Inherited `@requiredForTarget`, counted across all implementers of `interface`.
    RequiredForTargetAccordingToInterface { interface: String },
    /// `@required` on a reverse edge field (`_<field>From<Type>`).
    Required,
    /// `@export(as: "name")`: selection-time only.
    Export { alias: String },
}

impl Directive {
    pub const NOLOOPS: &'static str = "noloops";
    pub const DISTINCT: &'static str = "distinct";
    pub const UNIQUE_FOR_TARGET: &'static str = "uniqueForTarget";
    pub const UNIQUE_FOR_TARGET_IFACE: &'static str = "_uniqueForTarget_AccordingToInterface";
    pub const REQUIRED_FOR_TARGET: &'static str = "requiredForTarget";
    pub const REQUIRED_FOR_TARGET_IFACE: &'static str = "_requiredForTarget_AccordingToInterface";
    pub const REQUIRED: &'static str = "required";
    pub const EXPORT: &'static str = "export";

    /// Interpret a schema directive. `Ok(None)` for directives this crate ignores.
    pub fn from_use(d: &DirectiveUse) -> Result<Option<Directive>> {
        Ok(Some(match d.name.as_str() {
            Self::NOLOOPS => Directive::NoLoops,
            Self::DISTINCT => Directive::Distinct,
            Self::UNIQUE_FOR_TARGET => Directive::UniqueForTarget,
            Self::UNIQUE_FOR_TARGET_IFACE => Directive::UniqueForTargetAccordingToInterface {
                interface: single_string_arg(d)?,
            },
            Self::REQUIRED_FOR_TARGET => Directive::RequiredForTarget,
            Self::REQUIRED_FOR_TARGET_IFACE => Directive::RequiredForTargetAccordingToInterface {
                interface: single_string_arg(d)?,
            },
            Self::REQUIRED => Directive::Required,
            Self::EXPORT => Directive::Export { alias: single_string_arg(d)? },
            _ => return Ok(None),
        }))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::NoLoops => Self::NOLOOPS,
            Directive::Distinct => Self::DISTINCT,
            Directive::UniqueForTarget => Self::UNIQUE_FOR_TARGET,
            Directive::UniqueForTargetAccordingToInterface { .. } => Self::UNIQUE_FOR_TARGET_IFACE,
            Directive::RequiredForTarget => Self::REQUIRED_FOR_TARGET,
            Directive::RequiredForTargetAccordingToInterface { .. } => Self::REQUIRED_FOR_TARGET_IFACE,
            Directive::Required => Self::REQUIRED,
            Directive::Export { .. } => Self::EXPORT,
        }
    }
}

/// Interface-qualified directives take exactly one string argument.
fn single_string_arg(d: &DirectiveUse) -> Result<String> {
    match d.arguments.as_slice() {
        [(_, Value::String(s))] => Ok(s.clone()),
        _ => Err(Error::Schema(format!(
            "directive @{} expects exactly one string argument",
            d.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_directives() {
        assert_eq!(Directive::from_use(&DirectiveUse::new("noloops")).unwrap(), Some(Directive::NoLoops));
        assert_eq!(
            Directive::from_use(&DirectiveUse::new("_uniqueForTarget_AccordingToInterface").arg("interfaceName", "Character")).unwrap(),
            Some(Directive::UniqueForTargetAccordingToInterface { interface: "Character".into() })
        );
    }

    #[test]
    fn test_unknown_directive_ignored() {
        assert_eq!(Directive::from_use(&DirectiveUse::new("deprecated")).unwrap(), None);
    }

    #[test]
    fn test_interface_variant_needs_one_string() {
        assert!(Directive::from_use(&DirectiveUse::new("_requiredForTarget_AccordingToInterface")).is_err());
        let two = DirectiveUse::new("_requiredForTarget_AccordingToInterface").arg("a", "X").arg("b", "Y");
        assert!(Directive::from_use(&two).is_err());
        let number = DirectiveUse::new("_requiredForTarget_AccordingToInterface").arg("a", 1);
        assert!(Directive::from_use(&number).is_err());
    }
}
