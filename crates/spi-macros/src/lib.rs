//! Procedural macros for the SPI engine.
//!
//! This crate provides:
//!
//! - `#[implementation(...)]` - Registers a constructor function under an
//!   implementation name
//!
//! # Implementation Attribute
//!
//! The decorated function is the single constructor of the implementation.
//! Its signature decides what it receives at load time:
//!
//! | Parameter                                     | Receives                          |
//! |-----------------------------------------------|-----------------------------------|
//! | none                                          | nothing, any argument is ignored  |
//! | `&str`, `Option<&str>`, `String`, `Option<String>` | the configured argument      |
//! | `Parameters`                                  | `parameter/<arg>` of its group    |
//!
//! The return type may be the implementing type, a `Box` of it, or a
//! `Result` of either whose error converts into `BoxError`.
//!
//! ```rust,ignore
//! use spi::prelude::*;
//!
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! impl Contract for dyn Greeter {
//!     const NAME: &'static str = "demo.Greeter";
//! }
//!
//! struct English(String);
//!
//! impl Greeter for English {
//!     fn greet(&self, name: &str) -> String {
//!         format!("{}, {name}", self.0)
//!     }
//! }
//!
//! #[implementation(name = "demo.English", provides = dyn Greeter)]
//! fn english(salutation: Option<&str>) -> English {
//!     English(salutation.unwrap_or("Hello").to_string())
//! }
//! ```
//!
//! Expansions refer to `::spi_core`, so the calling crate must depend on
//! `spi-core`.

mod implementation;

use proc_macro::TokenStream;

/// Registers a function as the constructor of an implementation.
///
/// # Attributes
///
/// - `name = "..."` - Implementation name referenced by configuration values
/// - `provides = dyn Trait` - Contract the constructed object is boxed as
///
/// # Errors
///
/// Compilation fails when the function is `async`, generic, a method, or
/// takes more than one parameter or a parameter of an unsupported type.
#[proc_macro_attribute]
pub fn implementation(attr: TokenStream, item: TokenStream) -> TokenStream {
    implementation::implementation(attr, item)
}
