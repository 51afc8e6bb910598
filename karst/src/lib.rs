pub use karst_base as base;

pub use karst_api as api;

pub use karst_framework as framework;
