mod asset;
pub mod helpers;
mod secret;

pub use asset::{Asset, AssetConversionError};
pub use secret::Secret;
