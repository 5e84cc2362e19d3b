//! Macro for implementing string conversions on fieldless domain enums
//!
//! Status columns, event type names and submission types are all stored and
//! logged as short lowercase strings. This macro gives each enum a single
//! source of truth for that mapping.
//!
//! # Example
//!
//! ```rust
//! use fieldsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Lane {
//!     Red,
//!     Blue,
//! }
//!
//! impl_domain_status_conversions!(Lane {
//!     Red => "red",
//!     Blue => "blue",
//! });
//!
//! assert_eq!(Lane::Blue.as_str(), "blue");
//! assert_eq!("RED".parse::<Lane>().unwrap(), Lane::Red);
//! assert_eq!(Lane::ALL.len(), 2);
//! ```

/// Implements `as_str`, `ALL`, Display and FromStr for fieldless enums
///
/// - `as_str()` returns the canonical string
/// - `ALL` lists every variant in declaration order
/// - FromStr is case-insensitive and reports the enum name on failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$enum_name] = &[$(Self::$variant),+];

            /// Canonical string form used in storage and logs.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
