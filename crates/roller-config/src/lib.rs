//! A trait to read a config from the environment, falling back to defaults.
//!
//! # Example
//! ```no_run
//! use roller_config as config;
//! use serde::{
//!     Deserialize,
//!     Serialize,
//! };
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! pub struct MyConfig {
//!     pub log: String,
//!     pub relayer_binary: String,
//! }
//!
//! impl config::Config for MyConfig {
//!     const PREFIX: &'static str = "MY_TOOL_";
//! }
//!
//! let config: MyConfig = config::get().unwrap();
//! ```
use serde::{
    de::DeserializeOwned,
    Serialize,
};


#[cfg(feature = "tests")]
pub use tests::{
    config_falls_back_to_defaults,
    example_env_config_is_up_to_date,
};

/// Utility function to get a config without having to import the `Config` trait.
///
/// # Errors
/// Returns an error if a variable with the config's prefix cannot be deserialized
/// into its field.
pub fn get<T: Config>() -> Result<T, figment::Error> {
    T::get()
}

pub trait Config: Default + Serialize + DeserializeOwned {
    const PREFIX: &'static str;

    /// Reads the config from `RUST_LOG` and variables prefixed by [`Config::PREFIX`].
    ///
    /// Fields that are not set in the environment keep the value of
    /// [`Default::default`].
    ///
    /// # Errors
    /// Returns an error if an environment variable cannot be deserialized.
    fn get() -> Result<Self, figment::Error> {
        Self::get_with_prefix(Self::PREFIX, _internal::Internal)
    }

    #[doc(hidden)]
    fn get_with_prefix(
        prefix: &str,
        _internal: _internal::Internal,
    ) -> Result<Self, figment::Error> {
        use figment::{
            providers::{
                Env as FigmentEnv,
                Serialized,
            },
            Figment,
        };
        Figment::from(Serialized::defaults(Self::default()))
            .merge(FigmentEnv::prefixed("RUST_").split("_").only(&["log"]))
            .merge(FigmentEnv::prefixed(prefix))
            .extract()
    }
}

mod _internal {
    pub struct Internal;
}
