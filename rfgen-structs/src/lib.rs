pub mod config;
pub mod core;

/// Declares a serde struct with public fields and a getter per field.
///
/// Required fields get a `&T` getter. `Option<T>` fields are
/// `#[serde(default)]`, omitted from the output when `None`, and get an
/// `Option<&T>` getter.
#[macro_export]
macro_rules! serializable_struct_with_getters {
    ( @ $name:ident { } -> ($($fields:tt)*) ($($getters:tt)*) ) => (
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
        pub struct $name {
            $($fields)*
        }
        impl $name {
            $($getters)*
        }
    );
    ( @ $name:ident { $(#[$attr:meta])* $param:ident : Option<$type:ty>, $($rest:tt)* } -> ($($fields:tt)*) ($($getters:tt)*) ) => (
        serializable_struct_with_getters!(@ $name { $($rest)* } -> (
            $($fields)*
            $(#[$attr])*
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub $param : Option<$type>,
        ) (
            $($getters)*
            pub fn $param(&self) -> Option<&$type> {
                self.$param.as_ref()
            }
        ));
    );
    ( @ $name:ident { $(#[$attr:meta])* $param:ident : $type:ty, $($rest:tt)* } -> ($($fields:tt)*) ($($getters:tt)*) ) => (
        serializable_struct_with_getters!(@ $name { $($rest)* } -> (
            $($fields)*
            $(#[$attr])*
            pub $param : $type,
        ) (
            $($getters)*
            pub fn $param(&self) -> &$type {
                &self.$param
            }
        ));
    );
    ( $name:ident { $( $rest:tt)* } ) => {
        serializable_struct_with_getters!(@ $name { $($rest)* } -> () ());
    };
}
