//! Newtype IDs for type-safe handle references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing a DOM node handle with a listener or toast handle.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_u64()`
/// - `From<u64>` and `Into<u64>` implementations
///
/// # Example
///
/// ```rust
/// # use visual_search_core::define_id;
/// define_id!(WidgetId);
/// define_id!(FrameId);
///
/// let widget = WidgetId::new(1);
/// let frame = FrameId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: WidgetId = frame;
/// assert_eq!(widget.as_u64(), frame.as_u64());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying u64 value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Handles into the host page model
define_id!(NodeId);
define_id!(ListenerId);
define_id!(ToastId);

// Drawer sessions and the requests issued within them
define_id!(SessionId);
define_id!(RequestId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_u64() {
        let id = NodeId::from(42);
        assert_eq!(u64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_ids_order_by_value() {
        assert!(SessionId::new(1) < SessionId::new(2));
    }
}
