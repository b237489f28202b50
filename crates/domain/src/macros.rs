//! Macro for implementing Display and FromStr for code enums
//!
//! Several enums in the client have a stable wire name (error codes, event
//! actions). This macro keeps the enum-to-string mapping in one place and
//! derives both directions from it. Parsing is case-insensitive.
//!
//! # Example
//!
//! ```rust
//! use basecamp_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Visibility {
//!     Everyone,
//!     TeamOnly,
//! }
//!
//! impl_domain_status_conversions!(Visibility {
//!     Everyone => "everyone",
//!     TeamOnly => "team_only",
//! });
//!
//! assert_eq!(Visibility::TeamOnly.to_string(), "team_only");
//! assert_eq!("EVERYONE".parse::<Visibility>().unwrap(), Visibility::Everyone);
//! ```

/// Implements Display and FromStr for enums with a fixed wire name per
/// variant
///
/// * `$enum_name` - The enum type
/// * `$variant => $str` - Variant to lowercase wire name
///
/// The generated `FromStr` returns `Err(String)` naming the enum and the
/// rejected input.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let name = match self {
                    $(Self::$variant => $str,)+
                };
                f.pad(name)
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Action {
        Created,
        Trashed,
        ContentChanged,
    }

    impl_domain_status_conversions!(Action {
        Created => "created",
        Trashed => "trashed",
        ContentChanged => "content_changed",
    });

    #[test]
    fn test_display_uses_wire_name() {
        assert_eq!(Action::Created.to_string(), "created");
        assert_eq!(Action::ContentChanged.to_string(), "content_changed");
        assert_eq!(format!("{:>9}", Action::Trashed), "  trashed");
    }

    #[test]
    fn test_fromstr_ignores_case() {
        assert_eq!(Action::from_str("TRASHED").unwrap(), Action::Trashed);
        assert_eq!(Action::from_str("Content_Changed").unwrap(), Action::ContentChanged);
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = Action::from_str("archived").unwrap_err();
        assert!(err.contains("Invalid Action: archived"));
        assert!(Action::from_str("").is_err());
    }
}
