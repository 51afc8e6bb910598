//! Backend-agnostic scalar graphics types and the common error type shared by the karst
//! crates. A concrete GPU backend (Vulkan, D3D, Metal) maps these onto its own enums; the
//! higher layers never see a native API type.

mod error;
pub use error::*;

mod types;
pub use types::*;
