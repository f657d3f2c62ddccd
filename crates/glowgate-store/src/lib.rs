//! `glowgate-store` – Remembered state.
//!
//! The gateway persists nothing beyond the last known owner credentials, the
//! last connected controller address, the boot marker and the last written
//! TNGL program.
//!
//! # Modules
//!
//! - [`credentials`] – [`CredentialStore`][credentials::CredentialStore]:
//!   one plain-text file per record under the assets directory.

pub mod credentials;

pub use credentials::{CredentialStore, OwnerInfo, Record, StoreError};
