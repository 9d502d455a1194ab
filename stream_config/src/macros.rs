/// Macro to create a configuration value group struct.
///
/// Usage:
/// ```rust
/// mod my_group {
///     stream_config::config_group!({
///         ref test_int: usize = 42;
///         ref test_string: String = "default".to_string();
///     });
/// }
///
/// let values = my_group::ConfigValueGroup::default();
/// assert_eq!(values.test_int, 42);
/// ```
///
/// This creates a `ConfigValueGroup` struct with the specified fields. Environment
/// variables named `PIECESTREAM_{GROUP}_{FIELD}` (the group name is the enclosing
/// module's name) override the defaults when `apply_env_overrides` is called.
#[macro_export]
macro_rules! config_group {
    ({
        $(
            $(#[$meta:meta])*
            ref $name:ident : $type:ty = $value:expr;
        )+
    }) => {
        #[allow(unused_imports)]
        use $crate::ParsableConfigValue;

        /// ConfigValueGroup struct containing all configurable values
        #[derive(Debug, Clone)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            fn default() -> Self {
                Self {
                    $(
                        $name: {
                            let v: $type = $value;
                            v
                        },
                    )+
                }
            }
        }

        impl AsRef<ConfigValueGroup> for ConfigValueGroup {
            fn as_ref(&self) -> &ConfigValueGroup {
                self
            }
        }

        impl ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            /// This is an alias for `Default::default()`.
            pub fn new() -> Self {
                Self::default()
            }

            /// Apply environment variable overrides to this configuration group.
            ///
            /// The group name is derived from the module path. For example, in module
            /// `stream_config::groups::streaming`, the env var for memory_budget is
            /// PIECESTREAM_STREAMING_MEMORY_BUDGET.
            pub fn apply_env_overrides(&mut self) {
                $(
                    {
                        // Build the env var name at compile time from the module path
                        const ENV_VAR_NAME: &str = $crate::const_str::concat!(
                            "PIECESTREAM_",
                            $crate::const_str::convert_ascii_case!(upper, $crate::konst::string::rsplit_once(module_path!(), "::").unwrap().1),
                            "_",
                            $crate::const_str::convert_ascii_case!(upper, stringify!($name)));

                        let maybe_env_value = std::env::var(ENV_VAR_NAME).ok();

                        let default_value: $type = $value;
                        self.$name = <$type>::parse(stringify!($name), maybe_env_value, default_value);
                    }
                )+
            }
        }

        /// Type alias for easier reference in config aggregation
        pub(crate) type ConfigValues = ConfigValueGroup;
    };
}
